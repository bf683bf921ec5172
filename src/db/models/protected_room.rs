use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct ProtectedRoom {
    pub id: i64,
    pub room_address: String,
    pub added_at: i64,
}
