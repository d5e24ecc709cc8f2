//! SQLite assignment store implementation.

use crate::{Error, PrincipalRecord, ResourceRecord, Result};
use chrono::{DateTime, Utc};
use policy::{
    Capability, CapabilityEntry, Catalog, DEFAULT_ROLE, Principal, PrincipalId, ResourceId, Role,
    RoleRegistry, RoleStore,
};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store for the catalog, roles, principals and resources.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS capabilities (
                token TEXT PRIMARY KEY,
                resource TEXT NOT NULL,
                description TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS roles (
                name TEXT PRIMARY KEY,
                description TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS role_capabilities (
                role TEXT NOT NULL REFERENCES roles(name) ON DELETE CASCADE,
                token TEXT NOT NULL REFERENCES capabilities(token),
                PRIMARY KEY (role, token)
            );
            CREATE TABLE IF NOT EXISTS principals (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                is_superuser INTEGER NOT NULL DEFAULT 0,
                is_staff INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS principal_roles (
                principal_id TEXT NOT NULL REFERENCES principals(id) ON DELETE CASCADE,
                role TEXT NOT NULL REFERENCES roles(name) ON DELETE CASCADE,
                PRIMARY KEY (principal_id, role)
            );
            CREATE TABLE IF NOT EXISTS resources (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                owner_id TEXT REFERENCES principals(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_resources_owner
                ON resources(owner_id);
            "#,
        )?;
        Ok(())
    }

    /// Writers take the lock up front so two seeders never deadlock on a
    /// read-to-write upgrade.
    fn write_tx(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Load every capability row.
    pub fn load_catalog(&self) -> Result<Catalog> {
        let mut stmt = self
            .conn
            .prepare("SELECT token, resource, description FROM capabilities ORDER BY token")?;
        let entries = stmt
            .query_map([], |row| {
                Ok(CapabilityEntry {
                    capability: Capability::new(row.get::<_, String>(0)?),
                    resource: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries.into_iter().collect())
    }

    /// Materialize every role and its current capability set.
    pub fn load_registry(&self) -> Result<RoleRegistry> {
        let mut roles: BTreeMap<String, Role> = BTreeMap::new();

        let mut stmt = self.conn.prepare("SELECT name, description FROM roles")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (name, description) = row?;
            roles.insert(
                name,
                Role {
                    description,
                    capabilities: BTreeSet::new(),
                },
            );
        }

        let mut stmt = self
            .conn
            .prepare("SELECT role, token FROM role_capabilities")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (role, token) = row?;
            if let Some(entry) = roles.get_mut(&role) {
                entry.capabilities.insert(Capability::new(token));
            }
        }

        let mut registry = RoleRegistry::new();
        for (name, role) in roles {
            registry.insert(name, role);
        }
        registry.learn_capabilities(self.load_catalog()?.entries().cloned());
        Ok(registry)
    }

    /// Create a principal holding the default role.
    ///
    /// The default role is created if it does not exist yet.
    pub fn create_principal(
        &self,
        username: &str,
        is_superuser: bool,
        is_staff: bool,
    ) -> Result<Principal> {
        let tx = self.write_tx()?;

        let taken: Option<String> = tx
            .query_row(
                "SELECT id FROM principals WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(Error::Conflict(format!("user '{username}'")));
        }

        let mut principal = Principal::new(username);
        principal.is_superuser = is_superuser;
        principal.is_staff = is_staff;

        tx.execute(
            "INSERT INTO principals (id, username, is_superuser, is_staff, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                principal.id.to_string(),
                username,
                is_superuser,
                is_staff,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO roles (name, description) VALUES (?1, '')",
            [DEFAULT_ROLE],
        )?;
        tx.execute(
            "INSERT INTO principal_roles (principal_id, role) VALUES (?1, ?2)",
            params![principal.id.to_string(), DEFAULT_ROLE],
        )?;
        tx.commit()?;

        tracing::info!(user = %username, id = %principal.id, "created principal");
        Ok(principal)
    }

    /// Look up a principal by username, with its roles.
    pub fn find_principal(&self, username: &str) -> Result<Principal> {
        let row = self
            .conn
            .query_row(
                "SELECT id, username, is_superuser, is_staff, created_at
                 FROM principals WHERE username = ?1",
                [username],
                principal_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("user '{username}'")))?;
        Ok(self.materialize(row)?.principal)
    }

    /// Every principal, ordered by username.
    pub fn list_principals(&self) -> Result<Vec<PrincipalRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, is_superuser, is_staff, created_at
             FROM principals ORDER BY username",
        )?;
        let rows = stmt
            .query_map([], principal_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }

    fn materialize(&self, row: PrincipalRow) -> Result<PrincipalRecord> {
        let id = PrincipalId(parse_uuid(&row.id)?);

        let mut stmt = self
            .conn
            .prepare("SELECT role FROM principal_roles WHERE principal_id = ?1")?;
        let roles = stmt
            .query_map([&row.id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;

        Ok(PrincipalRecord {
            principal: Principal {
                id,
                username: row.username,
                is_superuser: row.is_superuser,
                is_staff: row.is_staff,
                roles,
            },
            created_at: parse_timestamp(&row.created_at)?,
        })
    }

    /// Add a principal to a role. Returns `false` if it already held it.
    pub fn assign_role(&self, username: &str, role: &str) -> Result<bool> {
        let tx = self.write_tx()?;
        let principal_id = principal_id_in(&tx, username)?;
        require_role_in(&tx, role)?;

        let added = tx.execute(
            "INSERT OR IGNORE INTO principal_roles (principal_id, role) VALUES (?1, ?2)",
            params![principal_id, role],
        )? == 1;
        tx.commit()?;

        if added {
            tracing::info!(user = %username, %role, "assigned role");
        }
        Ok(added)
    }

    /// Remove a principal from a role. Returns `false` if it did not hold it.
    pub fn revoke_role(&self, username: &str, role: &str) -> Result<bool> {
        let tx = self.write_tx()?;
        let principal_id = principal_id_in(&tx, username)?;
        require_role_in(&tx, role)?;

        let removed = tx.execute(
            "DELETE FROM principal_roles WHERE principal_id = ?1 AND role = ?2",
            params![principal_id, role],
        )? == 1;
        tx.commit()?;

        if removed {
            tracing::info!(user = %username, %role, "revoked role");
        }
        Ok(removed)
    }

    /// Store a resource instance.
    pub fn create_resource(
        &self,
        kind: &str,
        title: &str,
        owner: Option<PrincipalId>,
    ) -> Result<ResourceRecord> {
        let record = ResourceRecord {
            id: ResourceId::new(),
            kind: kind.to_string(),
            title: title.to_string(),
            owner,
            created_at: Utc::now(),
        };
        self.conn.execute(
            "INSERT INTO resources (id, kind, title, owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id.to_string(),
                record.kind,
                record.title,
                record.owner.map(|o| o.to_string()),
                record.created_at.to_rfc3339(),
            ],
        )?;
        tracing::debug!(id = %record.id, kind = %record.kind, "created resource");
        Ok(record)
    }

    /// Look up a resource by id.
    pub fn find_resource(&self, id: ResourceId) -> Result<ResourceRecord> {
        let (kind, title, owner, created_at) = self
            .conn
            .query_row(
                "SELECT kind, title, owner_id, created_at FROM resources WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("resource {id}")))?;

        Ok(ResourceRecord {
            id,
            kind,
            title,
            owner: owner
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(PrincipalId),
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

impl RoleStore for Store {
    type Error = Error;

    fn ensure_capabilities(&mut self, entries: &[CapabilityEntry]) -> Result<()> {
        let tx = self.write_tx()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO capabilities (token, resource, description)
                 VALUES (?1, ?2, ?3)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.capability.as_str(),
                    entry.resource,
                    entry.description,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_or_create_role(&mut self, name: &str, description: &str) -> Result<bool> {
        let created = self.conn.execute(
            "INSERT OR IGNORE INTO roles (name, description) VALUES (?1, ?2)",
            params![name, description],
        )? == 1;
        Ok(created)
    }

    fn replace_capabilities(&mut self, role: &str, capabilities: &BTreeSet<Capability>) -> Result<()> {
        let tx = self.write_tx()?;
        require_role_in(&tx, role)?;

        tx.execute("DELETE FROM role_capabilities WHERE role = ?1", [role])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO role_capabilities (role, token) VALUES (?1, ?2)")?;
            for capability in capabilities {
                stmt.execute(params![role, capability.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_catalog(&self) -> Result<Catalog> {
        Store::load_catalog(self)
    }
}

struct PrincipalRow {
    id: String,
    username: String,
    is_superuser: bool,
    is_staff: bool,
    created_at: String,
}

fn principal_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrincipalRow> {
    Ok(PrincipalRow {
        id: row.get(0)?,
        username: row.get(1)?,
        is_superuser: row.get(2)?,
        is_staff: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn principal_id_in(conn: &Connection, username: &str) -> Result<String> {
    conn.query_row(
        "SELECT id FROM principals WHERE username = ?1",
        [username],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("user '{username}'")))
}

fn require_role_in(conn: &Connection, role: &str) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM roles WHERE name = ?1", [role], |row| row.get(0))
        .optional()?;
    exists
        .map(|_| ())
        .ok_or_else(|| Error::NotFound(format!("role '{role}'")))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    s.parse()
        .map_err(|e| Error::Corrupt(format!("invalid id '{s}': {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    s.parse()
        .map_err(|e| Error::Corrupt(format!("invalid timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::{Authorizer, Bootstrap, RoleDefinition, seed};

    fn seeded() -> Store {
        let mut store = Store::in_memory().unwrap();
        let bootstrap = Bootstrap::site_default();
        seed(&mut store, &bootstrap.catalog(), &bootstrap.roles).unwrap();
        store
    }

    fn held(store: &Store, role: &str) -> Vec<String> {
        store
            .load_registry()
            .unwrap()
            .capabilities(role)
            .map(|c| c.to_string())
            .collect()
    }

    #[test]
    fn test_seed_round_trips_through_sqlite() {
        let store = seeded();
        let registry = store.load_registry().unwrap();

        assert_eq!(registry.roles().count(), 4);
        assert_eq!(
            registry.capabilities("Site Admins").count(),
            Catalog::site_default().len()
        );
        assert_eq!(held(&store, "Members"), ["add_article", "change_article"]);
        assert_eq!(store.load_catalog().unwrap().len(), Catalog::site_default().len());
    }

    #[test]
    fn test_reseed_converges() {
        let mut store = seeded();
        let catalog = Catalog::site_default();
        let defs = vec![RoleDefinition::new("Members", "").tokens(["add_article"])];

        let report = seed(&mut store, &catalog, &defs).unwrap();
        assert_eq!(report.created().count(), 0);
        assert_eq!(held(&store, "Members"), ["add_article"]);
        // Roles outside the definitions are left alone.
        assert_eq!(held(&store, "Authors").len(), 5);
    }

    #[test]
    fn test_reseed_with_base_catalog_keeps_admin_coverage() {
        let mut store = seeded();
        let bootstrap = Bootstrap::site_default();
        let mut extended = bootstrap.catalog();
        extended.register_resource("comment");
        seed(&mut store, &extended, &bootstrap.roles).unwrap();

        seed(&mut store, &bootstrap.catalog(), &bootstrap.roles).unwrap();

        let stored = store.load_catalog().unwrap();
        assert_eq!(stored.len(), Catalog::site_default().len() + 4);
        let registry = store.load_registry().unwrap();
        assert_eq!(registry.capabilities("Site Admins").count(), stored.len());

        store.create_principal("ada", false, false).unwrap();
        store.assign_role("ada", "Site Admins").unwrap();
        let admin = store.find_principal("ada").unwrap();
        let auth = Authorizer::new(&registry);
        assert!(auth.can(&admin, &"delete_comment".into()));
    }

    #[test]
    fn test_unknown_token_writes_nothing() {
        let mut store = Store::in_memory().unwrap();
        let defs = vec![RoleDefinition::new("Authors", "").tokens(["can_fly"])];

        let err = seed(&mut store, &Catalog::site_default(), &defs).unwrap_err();
        assert!(matches!(
            err,
            Error::Policy(policy::Error::UnknownCapability { .. })
        ));
        assert_eq!(store.load_registry().unwrap().roles().count(), 0);
        assert!(store.load_catalog().unwrap().is_empty());
    }

    #[test]
    fn test_new_principal_is_member() {
        let store = seeded();
        let alice = store.create_principal("alice", false, false).unwrap();
        assert!(alice.has_role(DEFAULT_ROLE));

        let loaded = store.find_principal("alice").unwrap();
        assert_eq!(loaded, alice);

        let registry = store.load_registry().unwrap();
        let auth = Authorizer::new(&registry);
        assert!(auth.can(&loaded, &"add_article".into()));
        assert!(!auth.can(&loaded, &"publish_article".into()));
    }

    #[test]
    fn test_principal_before_seed_creates_default_role() {
        let store = Store::in_memory().unwrap();
        let bob = store.create_principal("bob", false, false).unwrap();

        assert!(bob.has_role(DEFAULT_ROLE));
        let registry = store.load_registry().unwrap();
        assert!(registry.contains(DEFAULT_ROLE));
        assert_eq!(registry.capabilities(DEFAULT_ROLE).count(), 0);
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let store = seeded();
        store.create_principal("alice", false, false).unwrap();
        let err = store.create_principal("alice", true, false).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_assign_and_revoke() {
        let store = seeded();
        store.create_principal("alice", false, false).unwrap();

        assert!(store.assign_role("alice", "Authors").unwrap());
        assert!(!store.assign_role("alice", "Authors").unwrap());
        assert!(store.find_principal("alice").unwrap().has_role("Authors"));

        assert!(store.revoke_role("alice", "Authors").unwrap());
        assert!(!store.revoke_role("alice", "Authors").unwrap());
        assert!(!store.find_principal("alice").unwrap().has_role("Authors"));

        assert!(matches!(
            store.assign_role("alice", "Ghosts"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.assign_role("nobody", "Authors"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_principals_sorted() {
        let store = seeded();
        store.create_principal("zoe", false, false).unwrap();
        store.create_principal("adam", true, true).unwrap();

        let users = store.list_principals().unwrap();
        let names: Vec<_> = users.iter().map(|u| u.principal.username.as_str()).collect();
        assert_eq!(names, ["adam", "zoe"]);
        assert!(users[0].principal.is_superuser);
        assert!(users[0].principal.is_staff);
    }

    #[test]
    fn test_resource_ownership() {
        let store = seeded();
        let alice = store.create_principal("alice", false, false).unwrap();
        let bob = store.create_principal("bob", false, false).unwrap();

        let created = store
            .create_resource("article", "Hello", Some(alice.id))
            .unwrap();
        let loaded = store.find_resource(created.id).unwrap();
        assert_eq!(loaded.owner, Some(alice.id));
        assert_eq!(loaded.title, "Hello");

        let registry = store.load_registry().unwrap();
        let auth = Authorizer::new(&registry);
        let edit = Bootstrap::site_default().guard("article_edit").unwrap().clone();
        let article = loaded.as_resource();
        assert!(auth.check(&alice, &edit, Some(&article)).is_allowed());
        assert!(!auth.check(&bob, &edit, Some(&article)).is_allowed());

        let orphan = store.create_resource("article", "Orphan", None).unwrap();
        assert!(!auth.check(&alice, &edit, Some(&orphan.as_resource())).is_allowed());
    }

    #[test]
    fn test_missing_resource() {
        let store = Store::in_memory().unwrap();
        assert!(matches!(
            store.find_resource(ResourceId::new()),
            Err(Error::NotFound(_))
        ));
    }
}
