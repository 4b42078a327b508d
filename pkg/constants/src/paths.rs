//! Filesystem path constants.

// ─── Controller ────────────────────────────────────────────────────────────

/// Default config file path for the mirroring controller.
pub const DEFAULT_CONTROLLER_CONFIG: &str = "/etc/slicemirror/config.yaml";

/// Default data directory for the controller state store.
pub const DEFAULT_CONTROLLER_DATA_DIR: &str = "/tmp/slicemirror-data";
