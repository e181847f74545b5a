use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    roles: String,
}

impl TryFrom<UserRow> for User {
    type Error = UserError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            roles: serde_json::from_str(&row.roles).map_err(UserError::InvalidRoles)?,
        })
    }
}

/// Errors from the user store.
#[derive(Debug)]
pub enum UserError {
    Database(sqlx::Error),
    Hash(bcrypt::BcryptError),
    /// The blocking hash task panicked or was cancelled
    HashTask(tokio::task::JoinError),
    /// The stored roles column is not a JSON string array
    InvalidRoles(serde_json::Error),
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserError::Database(e) => write!(f, "Database error: {}", e),
            UserError::Hash(e) => write!(f, "Password hashing error: {}", e),
            UserError::HashTask(e) => write!(f, "Password hashing task failed: {}", e),
            UserError::InvalidRoles(e) => write!(f, "Invalid stored roles: {}", e),
        }
    }
}

impl std::error::Error for UserError {}

impl From<sqlx::Error> for UserError {
    fn from(e: sqlx::Error) -> Self {
        UserError::Database(e)
    }
}

/// Hash `password` with bcrypt on the blocking pool.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, UserError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(UserError::HashTask)?
        .map_err(UserError::Hash)
}

/// Check `password` against a bcrypt hash on the blocking pool.
pub async fn verify_password_hash(password: &str, hash: &str) -> Result<bool, UserError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(UserError::HashTask)?
        .map_err(UserError::Hash)
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user with a bcrypt-hashed password. Returns the user ID.
    pub async fn create(
        &self,
        username: &str,
        password: &str,
        roles: &[String],
    ) -> Result<i64, UserError> {
        self.create_with_cost(username, password, roles, bcrypt::DEFAULT_COST)
            .await
    }

    /// Same as `create` with an explicit bcrypt cost (tests use the minimum of 4).
    pub async fn create_with_cost(
        &self,
        username: &str,
        password: &str,
        roles: &[String],
        cost: u32,
    ) -> Result<i64, UserError> {
        let hash = hash_password(password, cost).await?;
        let roles = serde_json::to_string(roles).map_err(UserError::InvalidRoles)?;

        let result =
            sqlx::query("INSERT INTO users (username, password_hash, roles) VALUES (?, ?, ?)")
                .bind(username)
                .bind(&hash)
                .bind(&roles)
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by username.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, password_hash, roles FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    /// Return the user if `password` matches the stored hash.
    pub async fn verify_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserError> {
        let Some(user) = self.get_by_username(username).await? else {
            return Ok(None);
        };

        if verify_password_hash(password, &user.password_hash).await? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}
