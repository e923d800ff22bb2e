//! Analysis settings store
//!
//! Holds the row-sample limit, the selected database type and the credential
//! fields entered for each type. Credentials are kept per type, so switching
//! the type back and forth never loses input.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Lower bound of the row-sample limit
pub const MIN_SAMPLE_ROWS: u32 = 10;
/// Upper bound of the row-sample limit
pub const MAX_SAMPLE_ROWS: u32 = 10_000;
/// Step applied by increment/decrement
pub const SAMPLE_ROWS_STEP: i64 = 10;
/// Initial row-sample limit
pub const DEFAULT_SAMPLE_ROWS: u32 = 100;

/// Database type the backend should connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    #[serde(rename = "")]
    Unset,
    Postgres,
    Mysql,
    #[serde(rename = "bigquery")]
    BigQuery,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Unset => "unset",
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Mysql => "mysql",
            DatabaseKind::BigQuery => "bigquery",
        }
    }

    /// Credential fields accepted for this type
    pub fn fields(&self) -> &'static [CredentialField] {
        use CredentialField as F;
        match self {
            DatabaseKind::Unset => &[],
            DatabaseKind::Postgres | DatabaseKind::Mysql => &[
                F::Url,
                F::Host,
                F::Port,
                F::User,
                F::Password,
                F::Database,
                F::Schema,
                F::TableId,
            ],
            DatabaseKind::BigQuery => &[
                F::ProjectId,
                F::DatasetId,
                F::TableId,
                F::GcpServiceKey,
            ],
        }
    }

    pub fn accepts(&self, field: CredentialField) -> bool {
        self.fields().contains(&field)
    }

    /// URL schemes accepted for the connection URL
    fn url_schemes(&self) -> &'static [&'static str] {
        match self {
            DatabaseKind::Postgres => &["postgres://", "postgresql://"],
            DatabaseKind::Mysql => &["mysql://"],
            _ => &[],
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "unset" => Ok(DatabaseKind::Unset),
            "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            "mysql" => Ok(DatabaseKind::Mysql),
            "bigquery" => Ok(DatabaseKind::BigQuery),
            other => Err(SettingsError::UnknownDatabaseKind(other.to_string())),
        }
    }
}

/// Named credential field; `Display` gives the wire name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialField {
    Url,
    Host,
    Port,
    User,
    Password,
    Database,
    Schema,
    TableId,
    ProjectId,
    DatasetId,
    GcpServiceKey,
}

impl CredentialField {
    pub fn wire_name(&self) -> &'static str {
        match self {
            CredentialField::Url => "url",
            CredentialField::Host => "host",
            CredentialField::Port => "port",
            CredentialField::User => "user",
            CredentialField::Password => "password",
            CredentialField::Database => "database",
            CredentialField::Schema => "schema",
            CredentialField::TableId => "tableId",
            CredentialField::ProjectId => "projectId",
            CredentialField::DatasetId => "datasetId",
            CredentialField::GcpServiceKey => "gcpServiceKey",
        }
    }

    /// Fields whose values must never show up in logs
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            CredentialField::Url | CredentialField::Password | CredentialField::GcpServiceKey
        )
    }
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for CredentialField {
    type Err = SettingsError;

    /// Accepts the wire name as well as its snake_case spelling
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "url" => CredentialField::Url,
            "host" => CredentialField::Host,
            "port" => CredentialField::Port,
            "user" => CredentialField::User,
            "password" => CredentialField::Password,
            "database" => CredentialField::Database,
            "schema" => CredentialField::Schema,
            "tableId" | "table_id" => CredentialField::TableId,
            "projectId" | "project_id" => CredentialField::ProjectId,
            "datasetId" | "dataset_id" => CredentialField::DatasetId,
            "gcpServiceKey" | "gcp_service_key" => CredentialField::GcpServiceKey,
            other => return Err(SettingsError::UnknownField(other.to_string())),
        };
        Ok(field)
    }
}

/// Relative or absolute change of the row-sample limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitChange {
    Increment,
    Decrement,
    Override(i64),
}

/// Credential values for one database type
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials(BTreeMap<CredentialField, String>);

impl Credentials {
    pub fn get(&self, field: CredentialField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    /// Value if present and not blank
    fn filled(&self, field: CredentialField) -> Option<&str> {
        self.get(field).map(str::trim).filter(|v| !v.is_empty())
    }

    fn set(&mut self, field: CredentialField, value: String) {
        self.0.insert(field, value);
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in &self.0 {
            if field.is_secret() {
                map.entry(field, &"***");
            } else {
                map.entry(field, value);
            }
        }
        map.finish()
    }
}

/// A configuration that passed validation, ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub kind: DatabaseKind,
    pub sample_row_limit: u32,
    pub schema: String,
    pub table: String,
    /// Non-empty credential fields for `kind`, keyed by wire name
    pub fields: BTreeMap<String, String>,
}

/// The configuration store
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    sample_row_limit: u32,
    database_kind: DatabaseKind,
    credentials: HashMap<DatabaseKind, Credentials>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            sample_row_limit: DEFAULT_SAMPLE_ROWS,
            database_kind: DatabaseKind::Unset,
            credentials: HashMap::new(),
        }
    }
}

impl AnalysisSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_row_limit(&self) -> u32 {
        self.sample_row_limit
    }

    pub fn database_kind(&self) -> DatabaseKind {
        self.database_kind
    }

    /// Credentials entered for the current type
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.get(&self.database_kind)
    }

    pub fn credential(&self, field: CredentialField) -> Option<&str> {
        self.credentials().and_then(|c| c.get(field))
    }

    /// Apply a step or override, then clamp into [MIN_SAMPLE_ROWS, MAX_SAMPLE_ROWS]
    pub fn set_sample_row_limit(&mut self, change: LimitChange) -> u32 {
        let current = i64::from(self.sample_row_limit);
        let requested = match change {
            LimitChange::Increment => current.saturating_add(SAMPLE_ROWS_STEP),
            LimitChange::Decrement => current.saturating_sub(SAMPLE_ROWS_STEP),
            LimitChange::Override(value) => value,
        };
        let clamped = requested.clamp(i64::from(MIN_SAMPLE_ROWS), i64::from(MAX_SAMPLE_ROWS));
        self.sample_row_limit = clamped as u32;
        self.sample_row_limit
    }

    /// Switch the database type; previously entered credentials stay
    pub fn set_database_kind(&mut self, kind: DatabaseKind) {
        self.database_kind = kind;
    }

    /// Set one credential field of the current database type
    ///
    /// Unknown names and fields that do not belong to the current type are
    /// rejected without touching any stored value.
    pub fn set_credential_field(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), SettingsError> {
        let field: CredentialField = name.parse()?;
        let kind = self.database_kind;
        if kind == DatabaseKind::Unset {
            return Err(SettingsError::DatabaseKindUnset);
        }
        if !kind.accepts(field) {
            return Err(SettingsError::FieldNotApplicable { field, kind });
        }
        self.credentials
            .entry(kind)
            .or_default()
            .set(field, value.into());
        Ok(())
    }

    /// Check the required fields for the current type
    pub fn validate(&self) -> Result<ValidatedRequest, SettingsError> {
        let kind = self.database_kind;
        let empty = Credentials::default();
        let creds = self.credentials().unwrap_or(&empty);

        let require = |field: CredentialField| {
            creds
                .filled(field)
                .ok_or(SettingsError::MissingField { field, kind })
        };

        let (schema, table) = match kind {
            DatabaseKind::Unset => return Err(SettingsError::DatabaseKindUnset),
            DatabaseKind::Postgres | DatabaseKind::Mysql => {
                let table = require(CredentialField::TableId)?;
                match creds.filled(CredentialField::Url) {
                    Some(url) => {
                        if !kind.url_schemes().iter().any(|s| url.starts_with(s)) {
                            return Err(SettingsError::InvalidField {
                                field: CredentialField::Url,
                                reason: format!(
                                    "expected a {} URL ({})",
                                    kind,
                                    kind.url_schemes().join(" or ")
                                ),
                            });
                        }
                    }
                    None => {
                        // Without a URL the discrete connection fields are all needed
                        for field in [
                            CredentialField::Host,
                            CredentialField::User,
                            CredentialField::Password,
                            CredentialField::Database,
                        ] {
                            require(field).map_err(|_| SettingsError::MissingField {
                                field: if field == CredentialField::Host {
                                    CredentialField::Url
                                } else {
                                    field
                                },
                                kind,
                            })?;
                        }
                    }
                }
                if let Some(port) = creds.filled(CredentialField::Port) {
                    port.parse::<u16>()
                        .map_err(|_| SettingsError::InvalidField {
                            field: CredentialField::Port,
                            reason: format!("'{port}' is not a valid port"),
                        })?;
                }
                let schema = creds.filled(CredentialField::Schema).unwrap_or_default();
                (schema.to_string(), table.to_string())
            }
            DatabaseKind::BigQuery => {
                require(CredentialField::ProjectId)?;
                let dataset = require(CredentialField::DatasetId)?;
                let table = require(CredentialField::TableId)?;
                require(CredentialField::GcpServiceKey)?;
                (dataset.to_string(), table.to_string())
            }
        };

        Ok(ValidatedRequest {
            kind,
            sample_row_limit: self.sample_row_limit,
            schema,
            table,
            fields: self.request_fields(),
        })
    }

    /// Non-empty credential fields of the current type, keyed by wire name
    pub fn request_fields(&self) -> BTreeMap<String, String> {
        let Some(creds) = self.credentials() else {
            return BTreeMap::new();
        };
        self.database_kind
            .fields()
            .iter()
            .filter_map(|field| {
                creds
                    .filled(*field)
                    .map(|value| (field.wire_name().to_string(), value.to_string()))
            })
            .collect()
    }
}
