//! Reference catalogs: a read-only cardinality sketch over a collection of
//! reference genomes, together with optional build metadata.
//!
//! File layout (all integers little-endian):
//!
//! ```text
//! magic "KRHL" | version u16 | p u8 | k u8 | 2^p register bytes
//! metadata flag u8 (0 = absent, 1 = present)
//! [name length u32 | name UTF-8 | source files u64 | successes u64 | failures u64 | build time u64]
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{KrarityError, Result};
use crate::io_utils::{expect_end, read_array, read_field};
use crate::sketch::CardinalitySketch;
use crate::sketch_params::SketchParams;

/// Longest catalog name accepted when reading a file.
const MAX_NAME_LENGTH: u32 = 4096;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub name: String,
    pub source_files: u64,
    pub successes: u64,
    pub failures: u64,
    /// Seconds since the Unix epoch.
    pub build_timestamp: u64,
}

impl CatalogMetadata {
    /// Metadata stamped with the current time.
    pub fn now(name: &str, source_files: u64, successes: u64, failures: u64) -> Self {
        let build_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        CatalogMetadata {
            name: name.to_string(),
            source_files,
            successes,
            failures,
            build_timestamp,
        }
    }
}

/// A reference sketch. Never modified once constructed; unions produce new sketches.
#[derive(Clone, Debug, PartialEq)]
pub struct Catalog {
    sketch: CardinalitySketch,
    metadata: Option<CatalogMetadata>,
}

impl Catalog {
    pub fn new(sketch: CardinalitySketch, metadata: Option<CatalogMetadata>) -> Self {
        Catalog { sketch, metadata }
    }

    pub fn sketch(&self) -> &CardinalitySketch {
        &self.sketch
    }

    pub fn params(&self) -> &SketchParams {
        self.sketch.params()
    }

    pub fn metadata(&self) -> Option<&CatalogMetadata> {
        self.metadata.as_ref()
    }

    pub fn name(&self) -> &str {
        self.metadata.as_ref().map_or("unnamed", |m| m.name.as_str())
    }

    /// Estimated number of distinct canonical k-mers in the catalog, |R|.
    pub fn cardinality(&self) -> f64 {
        self.sketch.estimate()
    }

    /// Union of the catalog with another sketch.
    pub fn union(&self, other: &CardinalitySketch) -> Result<CardinalitySketch> {
        self.sketch.merge(other)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.sketch.write_to(writer)?;

        match &self.metadata {
            None => writer.write_all(&[0])?,
            Some(metadata) => {
                writer.write_all(&[1])?;
                let name = metadata.name.as_bytes();
                writer.write_all(&(name.len() as u32).to_le_bytes())?;
                writer.write_all(name)?;
                for value in [
                    metadata.source_files,
                    metadata.successes,
                    metadata.failures,
                    metadata.build_timestamp,
                ] {
                    writer.write_all(&value.to_le_bytes())?;
                }
            }
        }

        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Catalog> {
        let sketch = CardinalitySketch::read_from(reader)?;

        let [flag]: [u8; 1] = read_array(reader, "metadata flag")?;
        let metadata = match flag {
            0 => None,
            1 => Some(read_metadata(reader)?),
            other => {
                return Err(KrarityError::MalformedSketchFile(format!(
                    "invalid metadata flag {other}"
                )));
            }
        };

        expect_end(reader)?;

        Ok(Catalog { sketch, metadata })
    }

    /// Write the catalog to a file, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Catalog> {
        if !path.exists() {
            return Err(KrarityError::InputNotFound(path.to_path_buf()));
        }

        let mut reader = BufReader::new(File::open(path)?);
        Catalog::read_from(&mut reader)
    }
}

fn read_metadata<R: Read>(reader: &mut R) -> Result<CatalogMetadata> {
    let name_len = u32::from_le_bytes(read_array(reader, "catalog name length")?);
    if name_len > MAX_NAME_LENGTH {
        return Err(KrarityError::MalformedSketchFile(format!(
            "catalog name length {name_len} exceeds {MAX_NAME_LENGTH}"
        )));
    }

    let mut name = vec![0u8; name_len as usize];
    read_field(reader, &mut name, "end of catalog name")?;
    let name = String::from_utf8(name)
        .map_err(|_| KrarityError::MalformedSketchFile("catalog name is not UTF-8".to_string()))?;

    let mut read_u64 = |field: &str| -> Result<u64> { Ok(u64::from_le_bytes(read_array(reader, field)?)) };

    Ok(CatalogMetadata {
        name,
        source_files: read_u64("source file count")?,
        successes: read_u64("success count")?,
        failures: read_u64("failure count")?,
        build_timestamp: read_u64("build timestamp")?,
    })
}
