use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    sqlx::Type,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_text_form_is_lowercase() {
        assert_eq!(Role::Teacher.to_string(), "teacher");
        assert_eq!(Role::from_str("student").unwrap(), Role::Student);
        assert!(Role::from_str("admin").is_err());
        assert_eq!(serde_json::to_string(&Role::Student).unwrap(), "\"student\"");
    }
}
