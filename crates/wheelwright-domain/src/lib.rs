#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod constraint;
pub mod filename;
pub mod metadata;
pub mod record;
pub mod selection;
pub mod target;
pub mod version;

pub use constraint::{historical_constraint, Bound, ConstraintError, RuntimeConstraint};
pub use filename::{normalize_distribution, FilenameError, WheelFilename, WHEEL_EXTENSION};
pub use metadata::{rewrite_version_header, MetadataDocument, METADATA_FILE};
pub use record::{encode_digest, Record, RecordEntry, RecordError, RECORD_FILE};
pub use selection::{PlatformSelector, RuntimeSpec, SelectionError, VariantSelector};
pub use target::{
    BuildTarget, Platform, PublishState, StageRegression, TargetProgress, TargetStage,
};
pub use version::{
    parse_upstream_version, RuntimeVersion, SuffixError, SuffixKind, VersionError, VersionSuffix,
    KNOWN_RUNTIMES,
};
