use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;

/// Per-tenant engines, keyed by the database name of the pgwire connection.
/// Each tenant owns its WAL file and a background compactor.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    ///
    /// Names that sanitize to the same file (`campus`, `cam.pus`, `../campus`)
    /// share one engine, so one WAL never has two writers.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        let safe_name = sanitize(tenant)?;
        if let Some(engine) = self.engines.get(&safe_name) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Entry lock keeps two first connections from opening the same WAL twice.
        let entry = self.engines.entry(safe_name.clone()).or_try_insert_with(|| {
            let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
            let engine = Arc::new(Engine::new(wal_path)?);
            tokio::spawn(compactor::run_compactor(engine.clone(), self.compact_threshold));
            tracing::info!("opened tenant {safe_name}");
            Ok::<_, std::io::Error>(engine)
        })?;
        let engine = entry.value().clone();
        drop(entry);

        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}

/// File-safe tenant key: alphanumerics, `_` and `-` only.
fn sanitize(tenant: &str) -> std::io::Result<String> {
    let safe_name: String = tenant
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe_name.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty tenant name",
        ));
    }
    if safe_name.len() > MAX_TENANT_NAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "tenant name too long",
        ));
    }
    Ok(safe_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::fs;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("classbook_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn tenants_schedule_independently() {
        let tm = TenantManager::new(test_data_dir("isolation"), 1000);
        let eng_a = tm.get_or_create("campus_a").unwrap();
        let eng_b = tm.get_or_create("campus_b").unwrap();

        let (room, prof) = (Ulid::new(), Ulid::new());
        let span = Span::new(1_727_776_800_000, 1_727_784_000_000);
        for eng in [&eng_a, &eng_b] {
            eng.create_room(room, "R".into(), 10).await.unwrap();
            eng.register_user(prof, "P".into(), Role::Professor).await.unwrap();
        }
        eng_a.create_booking(Ulid::new(), room, prof, span).await.unwrap();

        // The same room and slot are still free in the other tenant.
        assert!(eng_b.list_bookings().await.is_empty());
        eng_b.create_booking(Ulid::new(), room, prof, span).await.unwrap();
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = TenantManager::new(dir.clone(), 1000);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        let _eng = tm.get_or_create("my_db").unwrap();
        assert!(dir.join("my_db.wal").exists());
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let tm = TenantManager::new(test_data_dir("same_eng"), 1000);
        let eng1 = tm.get_or_create("foo").unwrap();
        let eng2 = tm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn tenant_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let tm = TenantManager::new(dir.clone(), 1000);

        let _eng = tm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());

        assert!(tm.get_or_create("../..").is_err());
    }

    #[tokio::test]
    async fn aliased_names_share_one_engine() {
        let dir = test_data_dir("aliases");
        let (room, prof) = (Ulid::new(), Ulid::new());
        let slot = Span::new(1_727_776_800_000, 1_727_784_000_000);
        {
            let tm = TenantManager::new(dir.clone(), 1000);
            let plain = tm.get_or_create("campus").unwrap();
            let dotted = tm.get_or_create("cam.pus").unwrap();
            let traversal = tm.get_or_create("../campus").unwrap();
            assert!(Arc::ptr_eq(&plain, &dotted));
            assert!(Arc::ptr_eq(&plain, &traversal));

            plain.create_room(room, "R".into(), 10).await.unwrap();
            plain.register_user(prof, "P".into(), Role::Professor).await.unwrap();
            plain.create_booking(Ulid::new(), room, prof, slot).await.unwrap();
            let second = dotted.create_booking(Ulid::new(), room, prof, slot).await;
            assert_eq!(second, Err(crate::engine::EngineError::RoomUnavailable(room)));
        }

        let tm = TenantManager::new(dir, 1000);
        let reopened = tm.get_or_create("campus").unwrap();
        assert_eq!(reopened.bookings_for_room(room).await.len(), 1);
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let tm = TenantManager::new(test_data_dir("name_too_long"), 1000);
        let long_name = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        let err = tm.get_or_create(&long_name).err().unwrap();
        assert!(err.to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_reopens_from_wal() {
        let dir = test_data_dir("reopen");
        let room = Ulid::new();
        {
            let tm = TenantManager::new(dir.clone(), 1000);
            let eng = tm.get_or_create("school").unwrap();
            eng.create_room(room, "Lab".into(), 12).await.unwrap();
        }
        let tm = TenantManager::new(dir, 1000);
        let rooms = tm.get_or_create("school").unwrap().list_rooms().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, room);
    }
}
