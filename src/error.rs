use thiserror::Error;

pub type TileResult<T> = Result<T, TileError>;

#[derive(Debug, Clone, Error)]
pub enum TileError {
    #[error("unknown tile group: {0}")]
    UnknownGroup(String),

    #[error("invalid tile coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("malformed query string: {0}")]
    MalformedQuery(String),

    #[error("unknown filter attribute '{attribute}' for layer '{layer}'")]
    UnknownAttribute { layer: String, attribute: String },

    #[error("invalid value '{value}' for filter attribute '{attribute}': expected {expected}")]
    InvalidFilterValue {
        attribute: String,
        value: String,
        expected: &'static str,
    },

    #[error("spatial store error: {0}")]
    Store(String),

    #[error("vector tile encoding failed: {0}")]
    Encode(String),

    #[error("tile request timed out")]
    Timeout,
}

impl TileError {
    pub fn status(&self) -> u16 {
        match self {
            TileError::Timeout => 500,
            _ => 400,
        }
    }

    // Text safe to hand to a client. Store and encoder details stay in the
    // logs.
    pub fn client_message(&self) -> String {
        match self {
            TileError::Store(_) => "tile query failed".to_string(),
            TileError::Encode(_) => "tile encoding failed".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TileError::UnknownGroup(_)
                | TileError::InvalidCoordinate(_)
                | TileError::MalformedQuery(_)
                | TileError::UnknownAttribute { .. }
                | TileError::InvalidFilterValue { .. }
        )
    }
}

impl From<rusqlite::Error> for TileError {
    fn from(err: rusqlite::Error) -> Self {
        TileError::Store(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid identifier '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidIdentifier(String),

    #[error("duplicate {kind} name: {name}")]
    Duplicate { kind: &'static str, name: String },

    #[error("layer '{layer}' references unknown collection '{collection}'")]
    UnknownCollection { layer: String, collection: String },

    #[error("layer '{layer}' references unknown column '{column}'")]
    UnknownColumn { layer: String, column: String },

    #[error("'{owner}' references unknown region type '{region}'")]
    UnknownRegion { owner: String, region: String },

    #[error("layer '{0}' uses the static query kind but its collection declares no region column")]
    MissingRegionColumn(String),

    #[error("setup attribute '{attribute}' of collection '{collection}' must be a boolean or an integer with choices")]
    SetupNotExpandable {
        collection: String,
        attribute: String,
    },

    #[error("unregistered tile group: {0}")]
    UnknownGroup(String),

    #[error("invalid zoom configuration: {0}")]
    InvalidZoom(String),

    #[error("legend entry '{0}' does not name a registered layer")]
    UnknownLegendLayer(String),
}
