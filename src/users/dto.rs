use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::{Phone, User};

/// Outward shape of a user, also accepted as create/update input.
///
/// Every field is optional so a partial update can tell "absent" from
/// "set". The password is read from requests but never written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserDto {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub active: Option<bool>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    pub token: Option<String>,
    pub phones: Option<Vec<PhoneDto>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneDto {
    pub id: Option<i64>,
    pub number: Option<String>,
    pub city_code: Option<String>,
    pub country_code: Option<String>,
}

pub fn to_dto(user: &User) -> UserDto {
    UserDto {
        id: Some(user.id),
        name: user.name.clone(),
        email: Some(user.email.clone()),
        password: None,
        active: Some(user.active),
        created_at: Some(user.created_at),
        modified_at: user.modified_at,
        last_login_at: user.last_login_at,
        token: user.token.clone(),
        phones: Some(user.phones.iter().map(phone_to_dto).collect()),
    }
}

pub fn phone_to_dto(phone: &Phone) -> PhoneDto {
    PhoneDto {
        id: phone.id,
        number: Some(phone.number.clone()),
        city_code: Some(phone.city_code.clone()),
        country_code: Some(phone.country_code.clone()),
    }
}

/// Copies the set fields of `dto` onto a fresh entity. The password is left
/// for the caller to hash.
pub fn from_dto(dto: &UserDto) -> User {
    let mut user = User::new(dto.created_at.unwrap_or_else(OffsetDateTime::now_utc));
    if let Some(id) = dto.id {
        user.id = id;
    }
    user.name = dto.name.clone();
    if let Some(email) = &dto.email {
        user.email = email.clone();
    }
    if let Some(active) = dto.active {
        user.active = active;
    }
    user.modified_at = dto.modified_at;
    user.last_login_at = dto.last_login_at;
    user.token = dto.token.clone();
    if let Some(phones) = &dto.phones {
        user.phones = phones.iter().map(|p| phone_from_dto(p, user.id)).collect();
    }
    user
}

pub fn phone_from_dto(dto: &PhoneDto, user_id: Uuid) -> Phone {
    Phone {
        id: dto.id,
        user_id,
        number: dto.number.clone().unwrap_or_default(),
        city_code: dto.city_code.clone().unwrap_or_default(),
        country_code: dto.country_code.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn full_dto() -> UserDto {
        UserDto {
            id: Some(Uuid::new_v4()),
            name: Some("Ana".into()),
            email: Some("ana@x.com".into()),
            password: Some("Abcdef1!".into()),
            active: Some(true),
            created_at: Some(datetime!(2024-01-02 03:04:05 UTC)),
            modified_at: Some(datetime!(2024-02-02 03:04:05 UTC)),
            last_login_at: Some(datetime!(2024-03-02 03:04:05 UTC)),
            token: Some("tok".into()),
            phones: Some(vec![PhoneDto {
                id: Some(7),
                number: Some("555".into()),
                city_code: Some("1".into()),
                country_code: Some("57".into()),
            }]),
        }
    }

    #[test]
    fn round_trip_keeps_everything_but_password() {
        let dto = full_dto();
        let back = to_dto(&from_dto(&dto));
        assert_eq!(back.password, None);
        assert_eq!(back, UserDto { password: None, ..dto });
    }

    #[test]
    fn round_trip_of_sparse_dto_keeps_set_fields() {
        let dto = UserDto {
            name: Some("Only name".into()),
            email: Some("n@x.com".into()),
            ..Default::default()
        };
        let back = to_dto(&from_dto(&dto));
        assert_eq!(back.name, dto.name);
        assert_eq!(back.email, dto.email);
    }

    #[test]
    fn serialized_dto_never_contains_password() {
        let json = serde_json::to_string(&full_dto()).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("Abcdef1!"));
        assert!(json.contains("ana@x.com"));
        assert!(json.contains("2024-01-02T03:04:05Z"));
    }

    #[test]
    fn deserializes_partial_body() {
        let dto: UserDto =
            serde_json::from_str(r#"{"name":"X","phones":[{"number":"1"}]}"#).unwrap();
        assert_eq!(dto.name.as_deref(), Some("X"));
        assert!(dto.email.is_none());
        let phones = dto.phones.unwrap();
        assert_eq!(phones[0].id, None);
        assert_eq!(phones[0].number.as_deref(), Some("1"));
    }

    #[test]
    fn phone_ids_and_owner_follow_entity() {
        let dto = full_dto();
        let user = from_dto(&dto);
        assert_eq!(user.phones[0].id, Some(7));
        assert_eq!(user.phones[0].user_id, user.id);
    }
}
