//! Core types for sidereal-import.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, ImportResult};

/// Builder that produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Producer {
    /// QEMU builder.
    Qemu,
    /// File builder.
    File,
    /// Artifice post-processor.
    Artifice,
}

impl Producer {
    /// Builder identifier of the QEMU builder.
    pub const QEMU_BUILDER_ID: &'static str = "transcend.qemu";
    /// Builder identifier of the file builder.
    pub const FILE_BUILDER_ID: &'static str = "packer.file";
    /// Builder identifier of the Artifice post-processor.
    pub const ARTIFICE_BUILDER_ID: &'static str = "packer.post-processor.artifice";

    /// Resolve a builder identifier against the allow-list.
    pub fn from_builder_id(builder_id: &str) -> ImportResult<Self> {
        match builder_id {
            Self::QEMU_BUILDER_ID => Ok(Self::Qemu),
            Self::FILE_BUILDER_ID => Ok(Self::File),
            Self::ARTIFICE_BUILDER_ID => Ok(Self::Artifice),
            other => Err(ImportError::UnsupportedArtifact {
                builder_id: other.to_owned(),
            }),
        }
    }

    /// The builder identifier for this producer.
    #[must_use]
    pub const fn builder_id(self) -> &'static str {
        match self {
            Self::Qemu => Self::QEMU_BUILDER_ID,
            Self::File => Self::FILE_BUILDER_ID,
            Self::Artifice => Self::ARTIFICE_BUILDER_ID,
        }
    }
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.builder_id())
    }
}

/// A build output handed over by an upstream builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Identifier of the builder that produced the artifact.
    pub builder_id: String,
    /// Files making up the artifact. The first one is the disk image.
    pub files: Vec<PathBuf>,
}

impl Artifact {
    /// Create a new artifact.
    #[must_use]
    pub fn new(builder_id: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            builder_id: builder_id.into(),
            files,
        }
    }

    /// Create an artifact holding a single disk image.
    #[must_use]
    pub fn image(producer: Producer, path: impl Into<PathBuf>) -> Self {
        Self::new(producer.builder_id(), vec![path.into()])
    }

    /// Check the builder against the allow-list.
    pub fn producer(&self) -> ImportResult<Producer> {
        Producer::from_builder_id(&self.builder_id)
    }

    /// Path of the disk image.
    pub fn image_path(&self) -> ImportResult<&Path> {
        self.files
            .first()
            .map(PathBuf::as_path)
            .ok_or(ImportError::MissingImage)
    }
}

/// Location of an object in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key within the bucket.
    pub key: String,
}

impl ObjectRef {
    /// Create a new object reference.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Generate a run-unique key for uploading `file_name`.
    #[must_use]
    pub fn generate(bucket: impl Into<String>, prefix: &str, file_name: &str) -> Self {
        let run_id = ulid::Ulid::new().to_string().to_lowercase();
        Self::new(bucket, format!("{prefix}{run_id}/{file_name}"))
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// An image uploaded to storage for registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    /// Where the image was stored.
    pub object: ObjectRef,
    /// Size in bytes.
    pub size: u64,
    /// Hex-encoded MD5 of the image.
    pub checksum: String,
    /// URL the provider fetches the image from.
    pub url: String,
}

/// Provider-issued template identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    /// Create a new template ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TemplateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A template registered with the compute provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Provider-issued identifier.
    pub id: TemplateId,
    /// Template name.
    pub name: String,
    /// Checksum of the source image.
    pub checksum: String,
    /// Zone the template lives in.
    pub zone: String,
    /// When the provider finished creating the template.
    pub created_at: Option<DateTime<Utc>>,
    /// Provider-reported state.
    pub state: Option<String>,
}

impl Template {
    /// Identifier of the import result, `zone:id`.
    #[must_use]
    pub fn artifact_id(&self) -> String {
        format!("{}:{}", self.zone, self.id)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Template: {} (ID: {}, zone: {})",
            self.name, self.id, self.zone
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("transcend.qemu", Producer::Qemu)]
    #[case("packer.file", Producer::File)]
    #[case("packer.post-processor.artifice", Producer::Artifice)]
    fn allow_listed_builders(#[case] builder_id: &str, #[case] expected: Producer) {
        let producer = Producer::from_builder_id(builder_id);
        assert!(matches!(producer, Ok(p) if p == expected));
        assert_eq!(expected.builder_id(), builder_id);
    }

    #[rstest]
    #[case("mitchellh.amazonebs")]
    #[case("")]
    #[case("transcend.QEMU")]
    fn other_builders_are_rejected(#[case] builder_id: &str) {
        let artifact = Artifact::new(builder_id, vec![PathBuf::from("disk.img")]);
        assert!(matches!(
            artifact.producer(),
            Err(ImportError::UnsupportedArtifact { .. })
        ));
    }

    #[test]
    fn image_path_is_first_file() {
        let artifact = Artifact::new(
            Producer::FILE_BUILDER_ID,
            vec![PathBuf::from("disk.img"), PathBuf::from("disk.img.sha256")],
        );
        assert!(matches!(artifact.image_path(), Ok(p) if p == Path::new("disk.img")));

        let empty = Artifact::new(Producer::FILE_BUILDER_ID, Vec::new());
        assert!(matches!(empty.image_path(), Err(ImportError::MissingImage)));
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = ObjectRef::generate("tmp", "imports/", "disk.img");
        let b = ObjectRef::generate("tmp", "imports/", "disk.img");

        assert_ne!(a.key, b.key);
        assert!(a.key.starts_with("imports/"));
        assert!(a.key.ends_with("/disk.img"));
        assert_eq!(a.bucket, "tmp");
    }

    #[test]
    fn template_artifact_id() {
        let template = Template {
            id: TemplateId::new("tmpl-123"),
            name: "my-template".to_owned(),
            checksum: "abc".to_owned(),
            zone: "ch-gva-2".to_owned(),
            created_at: None,
            state: None,
        };

        assert_eq!(template.artifact_id(), "ch-gva-2:tmpl-123");
        assert!(template.to_string().contains("my-template"));
    }
}
