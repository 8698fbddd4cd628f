use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{table} row {id} is missing required field '{field}'")]
    MissingField {
        table: String,
        id: u64,
        field: String,
    },

    #[error("{table} row {id} is missing required meta key '{key}'")]
    MissingMeta { table: String, id: u64, key: String },

    #[error("unable to determine the legacy site url (options.siteurl is empty)")]
    SiteUrlUnknown,

    #[error(
        "identity collision: legacy {table} #{legacy_id} is claimed by target records {first} and {second}"
    )]
    IdentityCollision {
        table: String,
        legacy_id: u64,
        first: u64,
        second: u64,
    },

    #[error("menu slug must be provided; available menus: {0}")]
    MenuSlugRequired(String),

    #[error("menu '{0}' is unknown or contains no items")]
    UnknownMenu(String),

    #[error("unable to handle menu item type '{item_type}' (menu item #{item})")]
    UnsupportedMenuItemType { item: u64, item_type: String },

    #[error("menu item #{item} references parent menu item #{parent} which could not be resolved")]
    MenuParentUnresolved { item: u64, parent: u64 },

    #[error("menu item #{0} is not reachable from a top-level item (cyclic parent chain)")]
    MenuCycle(u64),

    #[error("form field is unhandled type '{0}'")]
    UnsupportedFormField(String),

    #[error("form #{form} is invalid: {reason}")]
    InvalidForm { form: u64, reason: String },

    #[error("'{path}' lies outside the site root '{root}'; move legacy uploads under the site root")]
    OutsideAssetsRoot { path: String, root: String },

    #[error("{0}")]
    PrerequisiteMissing(String),

    #[error("target record {0} not found")]
    RecordNotFound(u64),

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("malformed serialized value: {0}")]
    Unserialize(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl MigrateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::MissingField { .. } => "missing_field",
            Self::MissingMeta { .. } => "missing_meta",
            Self::SiteUrlUnknown => "site_url_unknown",
            Self::IdentityCollision { .. } => "identity_collision",
            Self::MenuSlugRequired(_) => "menu_slug_required",
            Self::UnknownMenu(_) => "unknown_menu",
            Self::UnsupportedMenuItemType { .. } => "unsupported_menu_item_type",
            Self::MenuParentUnresolved { .. } => "menu_parent_unresolved",
            Self::MenuCycle(_) => "menu_cycle",
            Self::UnsupportedFormField(_) => "unsupported_form_field",
            Self::InvalidForm { .. } => "invalid_form",
            Self::OutsideAssetsRoot { .. } => "outside_assets_root",
            Self::PrerequisiteMissing(_) => "prerequisite_missing",
            Self::RecordNotFound(_) => "record_not_found",
            Self::Locked(_) => "locked",
            Self::Unserialize(_) => "unserialize_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
            Self::Db(_) => "db_error",
            Self::Walk(_) => "walk_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
