pub const SCHEMA: &str = r#"
-- Projects: one row per hosted project, forks included
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    namespace TEXT,               -- NULL = top-level project
    owner TEXT NOT NULL,          -- username of the owning user
    is_fork INTEGER NOT NULL DEFAULT 0,
    private INTEGER NOT NULL DEFAULT 0,

    -- Per-project switches, stored as a JSON object
    settings TEXT NOT NULL DEFAULT '{}',

    -- Region holding the writable copy, NULL when hosted locally
    replica_region TEXT,

    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_projects_name ON projects(name, namespace);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    fullname TEXT NOT NULL DEFAULT '',
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS groups (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS group_users (
    group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, user_id)
);

-- Direct access grants on a project
CREATE TABLE IF NOT EXISTS project_users (
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    access TEXT NOT NULL CHECK (access IN ('ticket', 'commit', 'admin')),
    PRIMARY KEY (project_id, user_id)
);

-- Group access grants on a project
CREATE TABLE IF NOT EXISTS project_groups (
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    access TEXT NOT NULL CHECK (access IN ('ticket', 'commit', 'admin')),
    PRIMARY KEY (project_id, group_id)
);

-- Project-scoped deploy keys; each key acts as a synthetic user
CREATE TABLE IF NOT EXISTS deploy_keys (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    push_access INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_deploy_keys_project ON deploy_keys(project_id);

CREATE TABLE IF NOT EXISTS pull_requests (
    id INTEGER PRIMARY KEY,
    uid TEXT NOT NULL UNIQUE,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,

    -- Source project; NULL once the fork is gone or for same-repo requests
    project_from_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,

    branch TEXT NOT NULL,         -- target branch
    branch_from TEXT NOT NULL,    -- source branch
    user TEXT NOT NULL,           -- username of the opener
    status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'merged', 'closed')),
    merge_status TEXT,            -- last evaluated feasibility, NULL = not evaluated
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_pull_requests_from
    ON pull_requests(project_from_id, branch_from);

-- Which optional hooks a project has switched on
CREATE TABLE IF NOT EXISTS hook_activations (
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    hook TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (project_id, hook)
);

-- Audit trail of denied pushes
CREATE TABLE IF NOT EXISTS push_rejections (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    username TEXT NOT NULL,
    refname TEXT NOT NULL,
    reason TEXT NOT NULL,
    rejected_at TEXT DEFAULT (datetime('now'))
);
"#;
