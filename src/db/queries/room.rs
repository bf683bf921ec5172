use sqlx::SqlitePool;

use crate::db::models::ProtectedRoom;

/// Returns false if the room was already protected
pub async fn add(pool: &SqlitePool, room_address: &str, added_at: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO rooms (room_address, added_at) VALUES (?, ?) ON CONFLICT (room_address) DO NOTHING",
    )
    .bind(room_address)
    .bind(added_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn remove(pool: &SqlitePool, room_address: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM rooms WHERE room_address = ?")
        .bind(room_address)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Protected rooms in the order they were added
pub async fn list(pool: &SqlitePool) -> Result<Vec<ProtectedRoom>, sqlx::Error> {
    sqlx::query_as::<_, ProtectedRoom>("SELECT * FROM rooms ORDER BY id")
        .fetch_all(pool)
        .await
}
