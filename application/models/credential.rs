use time::OffsetDateTime;

/// An issued API key and the identity it belongs to.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Credential {
    #[sqlx(rename = "user")]
    pub identity: String,
    #[sqlx(rename = "apikey")]
    pub api_key: String,
    pub created_at: OffsetDateTime,
}
