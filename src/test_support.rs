use std::sync::Arc;
use std::time::Duration;

use crate::bot::data::Data;
use crate::config::Settings;
use crate::db::pool::{create_memory_pool, run_migrations};
use crate::gateway::{Affiliation, MemoryGateway, RoomGateway};

pub const CONTROL_ROOM: &str = "admins@muc.example.org";
pub const ROOM_A: &str = "lobby@muc.example.org";
pub const ROOM_B: &str = "games@muc.example.org";

/// Bot state over an in-memory database and gateway.
///
/// `carol@example.org` is an admin present in the control room as
/// `carol`; `rooms` are joined and protected in the given order.
pub async fn harness(rooms: &[&str]) -> (Arc<Data>, Arc<MemoryGateway>) {
    let pool = create_memory_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();

    let mut settings = Settings::new("sqlite::memory:", "banbot@example.org", CONTROL_ROOM);
    settings.gateway_timeout = Duration::from_millis(200);

    let memory = Arc::new(MemoryGateway::new());
    let data = Arc::new(Data::new(pool, settings, memory.clone()));

    memory.join(CONTROL_ROOM, "banbot").await.unwrap();
    memory.set_affiliation(CONTROL_ROOM, "carol@example.org", Affiliation::Admin);
    data.identities.observe(
        CONTROL_ROOM,
        "carol",
        Some("carol@example.org"),
        Affiliation::Admin,
    );
    data.admins
        .refresh(&data.gateway(), CONTROL_ROOM)
        .await
        .unwrap();

    for room in rooms {
        memory.join(room, "banbot").await.unwrap();
        data.registry.add_room(room).await.unwrap();
    }

    (data, memory)
}
