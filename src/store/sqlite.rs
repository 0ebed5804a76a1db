use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_settings(s: &str) -> ProjectSettings {
    serde_json::from_str(s).unwrap_or_else(|e| {
        tracing::error!("Invalid project settings in database: '{}' - {}", s, e);
        ProjectSettings::default()
    })
}

fn parse_access(s: &str) -> AccessLevel {
    AccessLevel::parse(s).unwrap_or_else(|| {
        tracing::error!("Invalid access level in database: '{}'", s);
        AccessLevel::Ticket
    })
}

fn parse_status(s: &str) -> PullRequestStatus {
    PullRequestStatus::parse(s).unwrap_or_else(|| {
        tracing::error!("Invalid pull request status in database: '{}'", s);
        PullRequestStatus::Closed
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Project operations

    fn create_project(&self, project: &Project) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO projects (name, namespace, owner, is_fork, private, settings, replica_region, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project.name,
                project.namespace,
                project.owner,
                project.is_fork,
                project.private,
                serde_json::to_string(&project.settings)?,
                project.replica_region,
                format_datetime(&project.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_project(
        &self,
        namespace: Option<&str>,
        name: &str,
        fork_owner: Option<&str>,
    ) -> Result<Option<Project>> {
        let conn = self.conn();
        let query = |sql: &str, p: &[&dyn rusqlite::ToSql]| {
            conn.query_row(sql, p, |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    namespace: row.get(2)?,
                    owner: row.get(3)?,
                    is_fork: row.get(4)?,
                    private: row.get(5)?,
                    settings: parse_settings(&row.get::<_, String>(6)?),
                    replica_region: row.get(7)?,
                    created_at: parse_datetime(&row.get::<_, String>(8)?),
                })
            })
            .optional()
            .map_err(Error::from)
        };

        match fork_owner {
            Some(owner) => query(
                "SELECT id, name, namespace, owner, is_fork, private, settings, replica_region, created_at
                 FROM projects
                 WHERE name = ?1 AND namespace IS ?2 AND is_fork = 1 AND owner = ?3",
                &[&name, &namespace, &owner],
            ),
            None => query(
                "SELECT id, name, namespace, owner, is_fork, private, settings, replica_region, created_at
                 FROM projects
                 WHERE name = ?1 AND namespace IS ?2 AND is_fork = 0",
                &[&name, &namespace],
            ),
        }
    }

    fn get_project_by_id(&self, id: i64) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, namespace, owner, is_fork, private, settings, replica_region, created_at
             FROM projects WHERE id = ?1",
            params![id],
            |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    namespace: row.get(2)?,
                    owner: row.get(3)?,
                    is_fork: row.get(4)?,
                    private: row.get(5)?,
                    settings: parse_settings(&row.get::<_, String>(6)?),
                    replica_region: row.get(7)?,
                    created_at: parse_datetime(&row.get::<_, String>(8)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, namespace, owner, is_fork, private, settings, replica_region, created_at
             FROM projects ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
                namespace: row.get(2)?,
                owner: row.get(3)?,
                is_fork: row.get(4)?,
                private: row.get(5)?,
                settings: parse_settings(&row.get::<_, String>(6)?),
                replica_region: row.get(7)?,
                created_at: parse_datetime(&row.get::<_, String>(8)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // User and group operations

    fn create_user(&self, user: &User) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (username, fullname, created_at) VALUES (?1, ?2, ?3)",
            params![
                user.username,
                user.fullname,
                format_datetime(&user.created_at)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, fullname, created_at FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    fullname: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn create_group(&self, group: &Group) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO groups (name, created_at) VALUES (?1, ?2)",
            params![group.name, format_datetime(&group.created_at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, name, created_at FROM groups ORDER BY name")?;

        let rows = stmt.query_map([], |row| {
            Ok(Group {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn group_members(&self, group_id: i64) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.fullname, u.created_at
             FROM users u
             JOIN group_users gu ON gu.user_id = u.id
             WHERE gu.group_id = ?1
             ORDER BY u.username",
        )?;

        let rows = stmt.query_map(params![group_id], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                fullname: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn add_group_member(&self, group_id: i64, user_id: i64) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO group_users (group_id, user_id) VALUES (?1, ?2)",
            params![group_id, user_id],
        )?;
        Ok(())
    }

    // Access grants

    fn set_project_user(&self, project_id: i64, user_id: i64, access: AccessLevel) -> Result<()> {
        self.conn().execute(
            "INSERT INTO project_users (project_id, user_id, access) VALUES (?1, ?2, ?3)
             ON CONFLICT (project_id, user_id) DO UPDATE SET access = excluded.access",
            params![project_id, user_id, access.as_str()],
        )?;
        Ok(())
    }

    fn set_project_group(&self, project_id: i64, group_id: i64, access: AccessLevel) -> Result<()> {
        self.conn().execute(
            "INSERT INTO project_groups (project_id, group_id, access) VALUES (?1, ?2, ?3)
             ON CONFLICT (project_id, group_id) DO UPDATE SET access = excluded.access",
            params![project_id, group_id, access.as_str()],
        )?;
        Ok(())
    }

    fn user_access(&self, project: &Project, username: &str) -> Result<Option<AccessLevel>> {
        // The owner outranks any grant.
        if project.owner == username {
            return Ok(Some(AccessLevel::Admin));
        }

        let conn = self.conn();
        let direct: Option<String> = conn
            .query_row(
                "SELECT pu.access
                 FROM project_users pu
                 JOIN users u ON u.id = pu.user_id
                 WHERE pu.project_id = ?1 AND u.username = ?2",
                params![project.id, username],
                |row| row.get(0),
            )
            .optional()?;

        let mut best = direct.as_deref().map(parse_access);

        let mut stmt = conn.prepare(
            "SELECT pg.access
             FROM project_groups pg
             JOIN group_users gu ON gu.group_id = pg.group_id
             JOIN users u ON u.id = gu.user_id
             WHERE pg.project_id = ?1 AND u.username = ?2",
        )?;
        let rows = stmt.query_map(params![project.id, username], |row| {
            row.get::<_, String>(0)
        })?;
        for access in rows {
            best = best.max(Some(parse_access(&access?)));
        }

        Ok(best)
    }

    fn users_with_access(&self, project_id: i64, levels: &[AccessLevel]) -> Result<Vec<User>> {
        // Levels are a fixed vocabulary, never user input.
        let wanted = levels
            .iter()
            .map(|level| format!("'{}'", level.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT u.id, u.username, u.fullname, u.created_at
             FROM users u
             JOIN project_users pu ON pu.user_id = u.id
             WHERE pu.project_id = ?1 AND pu.access IN ({wanted})
             ORDER BY u.username"
        ))?;

        let rows = stmt.query_map(params![project_id], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                fullname: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn groups_with_access(&self, project_id: i64, levels: &[AccessLevel]) -> Result<Vec<Group>> {
        let wanted = levels
            .iter()
            .map(|level| format!("'{}'", level.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT g.id, g.name, g.created_at
             FROM groups g
             JOIN project_groups pg ON pg.group_id = g.id
             WHERE pg.project_id = ?1 AND pg.access IN ({wanted})
             ORDER BY g.name"
        ))?;

        let rows = stmt.query_map(params![project_id], |row| {
            Ok(Group {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Deploy keys

    fn create_deploy_key(&self, key: &DeployKey) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO deploy_keys (project_id, push_access, description, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                key.project_id,
                key.push_access,
                key.description,
                format_datetime(&key.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn deploy_keys(&self, project_id: i64) -> Result<Vec<DeployKey>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, push_access, description, created_at
             FROM deploy_keys WHERE project_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![project_id], |row| {
            Ok(DeployKey {
                id: row.get(0)?,
                project_id: row.get(1)?,
                push_access: row.get(2)?,
                description: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Pull request operations

    fn create_pull_request(&self, pr: &PullRequest) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO pull_requests
                 (uid, project_id, project_from_id, branch, branch_from, user, status, merge_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                pr.uid,
                pr.project_id,
                pr.project_from_id,
                pr.branch,
                pr.branch_from,
                pr.user,
                pr.status.as_str(),
                pr.merge_status,
                format_datetime(&pr.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_pull_request_by_uid(&self, uid: &str) -> Result<Option<PullRequest>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, uid, project_id, project_from_id, branch, branch_from, user, status, merge_status, created_at
             FROM pull_requests WHERE uid = ?1",
            params![uid],
            |row| {
                Ok(PullRequest {
                    id: row.get(0)?,
                    uid: row.get(1)?,
                    project_id: row.get(2)?,
                    project_from_id: row.get(3)?,
                    branch: row.get(4)?,
                    branch_from: row.get(5)?,
                    user: row.get(6)?,
                    status: parse_status(&row.get::<_, String>(7)?),
                    merge_status: row.get(8)?,
                    created_at: parse_datetime(&row.get::<_, String>(9)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn open_pull_requests_from(
        &self,
        project_from_id: i64,
        branch_from: &str,
    ) -> Result<Vec<PullRequest>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, uid, project_id, project_from_id, branch, branch_from, user, status, merge_status, created_at
             FROM pull_requests
             WHERE status = 'open' AND branch_from = ?2
               AND (project_from_id = ?1 OR (project_from_id IS NULL AND project_id = ?1))
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![project_from_id, branch_from], |row| {
            Ok(PullRequest {
                id: row.get(0)?,
                uid: row.get(1)?,
                project_id: row.get(2)?,
                project_from_id: row.get(3)?,
                branch: row.get(4)?,
                branch_from: row.get(5)?,
                user: row.get(6)?,
                status: parse_status(&row.get::<_, String>(7)?),
                merge_status: row.get(8)?,
                created_at: parse_datetime(&row.get::<_, String>(9)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn set_pull_request_merge_status(&self, uid: &str, merge_status: Option<&str>) -> Result<()> {
        self.conn().execute(
            "UPDATE pull_requests SET merge_status = ?2 WHERE uid = ?1",
            params![uid, merge_status],
        )?;
        Ok(())
    }

    // Hook activation and audit

    fn hook_active(&self, project_id: i64, hook: &str) -> Result<bool> {
        let conn = self.conn();
        let active: Option<bool> = conn
            .query_row(
                "SELECT active FROM hook_activations WHERE project_id = ?1 AND hook = ?2",
                params![project_id, hook],
                |row| row.get(0),
            )
            .optional()?;
        Ok(active.unwrap_or(false))
    }

    fn set_hook_active(&self, project_id: i64, hook: &str, active: bool) -> Result<()> {
        self.conn().execute(
            "INSERT INTO hook_activations (project_id, hook, active) VALUES (?1, ?2, ?3)
             ON CONFLICT (project_id, hook) DO UPDATE SET active = excluded.active",
            params![project_id, hook, active],
        )?;
        Ok(())
    }

    fn record_rejection(
        &self,
        project_id: i64,
        username: &str,
        refname: &str,
        reason: &str,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO push_rejections (project_id, username, refname, reason)
             VALUES (?1, ?2, ?3, ?4)",
            params![project_id, username, refname, reason],
        )?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
