use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

pub const ROLE_CUSTOMER: &str = "CUSTOMER";
pub const ROLE_STAFF: &str = "STAFF";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub role: String,
    pub is_active: bool,
    pub registered_at: NaiveDateTime,
    pub last_logged_in: Option<NaiveDateTime>,
}

impl User {
    pub async fn find_by_login(
        login: &str,
        db: &crate::database::Database,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE login = $1 AND is_active = true")
            .bind(login)
            .fetch_optional(&db.pool)
            .await
    }

    pub async fn find_by_email(
        email: &str,
        db: &crate::database::Database,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 AND is_active = true")
            .bind(email)
            .fetch_optional(&db.pool)
            .await
    }

    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }

    pub fn is_staff(&self) -> bool {
        self.role == ROLE_STAFF
    }
}
