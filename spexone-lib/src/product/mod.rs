//! SPEXone Level-1 products.
//!
//! A [Product] is a self-describing container of dimensions, groups, variables and
//! attributes whose layout is fixed per processing [Level] by a static [Schema]. Variables
//! declared against an unlimited first dimension grow as rows are written; the number of
//! rows written to each variable is tracked so that [Product::close] can report variables
//! that were not filled consistently.
//!
//! Products are persisted as a JSON document.
//!
//! # Example
//! ```
//! use chrono::{TimeZone, Utc};
//! use spexone::product::{DimSize, Level, Product};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("example.json");
//! let epoch = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
//!
//! let mut l1a = Product::create(&path, Level::L1A, epoch, &[("samples_per_image", DimSize::Fixed(2))]).unwrap();
//! l1a.write_variable("/science_data/detector_images", vec![1u16, 2], None).unwrap();
//! l1a.write_variable("/image_attributes/image_time", 3600.25, None).unwrap();
//! l1a.close().unwrap();
//!
//! let l1a = Product::open(&path).unwrap();
//! let start = l1a.get_attr("time_coverage_start", None).unwrap().unwrap();
//! assert_eq!(start.to_string(), "2023-03-01T01:00:00.250+00:00");
//! ```
mod attrs;
mod float;
mod schema;
mod values;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use typed_builder::TypedBuilder;

use crate::{Error, Result};

pub use attrs::AttrValue;
pub use schema::{CheckSet, DimDecl, DimSize, Level, Schema, VarDecl, L1A, L1B, L1C};
pub use values::{Dtype, Values};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    /// Current length; for unlimited dimensions the number of rows written so far.
    pub size: usize,
    pub unlimited: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Variable {
    pub dims: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
    pub values: Values,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Document {
    level: Level,
    epoch: DateTime<Utc>,
    dimensions: BTreeMap<String, Dimension>,
    groups: BTreeMap<String, BTreeMap<String, AttrValue>>,
    variables: BTreeMap<String, Variable>,
    attributes: BTreeMap<String, AttrValue>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created or append-opened; accepts writes.
    Open,
    /// Opened for inspection only.
    ReadOnly,
    Closed,
}

/// A variable whose stored row count does not match its dimension.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredMismatch {
    pub variable: String,
    pub dimension: String,
    pub stored: usize,
    pub expected: usize,
}

/// Global attributes written by [Product::fill_global_attrs].
#[derive(TypedBuilder, Debug, Clone)]
pub struct GlobalAttributes {
    /// Defaults to the product file name.
    #[builder(default, setter(strip_option, into))]
    pub product_name: Option<String>,
    /// Orbit revolution counter
    #[builder(default = -1)]
    pub orbit_number: i64,
    /// Size of the nadir footprint including units, e.g., `5km`
    #[builder(default, setter(strip_option, into))]
    pub bin_size: Option<String>,
    /// Measurements performed in-flight rather than on-ground
    #[builder(default)]
    pub inflight: bool,
    #[builder(default = Utc::now())]
    pub date_created: DateTime<Utc>,
}

impl Default for GlobalAttributes {
    fn default() -> Self {
        GlobalAttributes::builder().build()
    }
}

fn normalize(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

/// `epoch + seconds` at microsecond resolution, formatted with millisecond precision.
fn coverage_time(epoch: DateTime<Utc>, seconds: f64) -> String {
    let micros = (seconds * 1e6).round() as i64;
    (epoch + TimeDelta::microseconds(micros)).to_rfc3339_opts(SecondsFormat::Millis, false)
}

pub struct Product {
    path: PathBuf,
    schema: &'static Schema,
    doc: Document,
    stored: BTreeMap<&'static str, usize>,
    file: Option<File>,
    state: State,
}

impl Product {
    /// Create a new product at `path`, failing if it already exists.
    ///
    /// `dims` overrides the schema's default dimension sizes.
    ///
    /// # Errors
    /// [Error::Io] if the file exists or cannot be created, [Error::UnknownDimension] for
    /// a dimension override not declared for `level`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        level: Level,
        epoch: DateTime<Utc>,
        dims: &[(&str, DimSize)],
    ) -> Result<Self> {
        Self::create_inner(path.as_ref(), level, epoch, dims, false)
    }

    /// Like [Product::create], but replaces any existing file.
    ///
    /// # Errors
    /// See [Product::create].
    pub fn create_clobber<P: AsRef<Path>>(
        path: P,
        level: Level,
        epoch: DateTime<Utc>,
        dims: &[(&str, DimSize)],
    ) -> Result<Self> {
        Self::create_inner(path.as_ref(), level, epoch, dims, true)
    }

    fn create_inner(
        path: &Path,
        level: Level,
        epoch: DateTime<Utc>,
        dims: &[(&str, DimSize)],
        clobber: bool,
    ) -> Result<Self> {
        let schema = level.schema();
        schema.validate()?;

        let mut dimensions: BTreeMap<String, Dimension> = schema
            .dimensions
            .iter()
            .map(|d| (d.name.to_string(), Dimension::from(d.size)))
            .collect();
        for (name, size) in dims {
            let dim = dimensions
                .get_mut(*name)
                .ok_or_else(|| Error::UnknownDimension((*name).to_string()))?;
            *dim = Dimension::from(*size);
        }

        let mut variables = BTreeMap::default();
        for decl in schema.variables {
            let shape: Vec<usize> = decl.dims.iter().map(|d| dimensions[*d].size).collect();
            let mut attrs = BTreeMap::default();
            attrs.insert("long_name".to_string(), AttrValue::from(decl.long_name));
            if decl.path == schema.time_variable {
                let units = format!("seconds since {}", epoch.format("%Y-%m-%d %H:%M:%S"));
                attrs.insert("units".to_string(), AttrValue::from(units));
            } else if let Some(units) = decl.units {
                attrs.insert("units".to_string(), AttrValue::from(units));
            }
            variables.insert(
                decl.path.to_string(),
                Variable {
                    dims: decl.dims.iter().map(ToString::to_string).collect(),
                    attrs,
                    values: Values::zeros(decl.dtype, &shape),
                },
            );
        }

        let doc = Document {
            level,
            epoch,
            dimensions,
            groups: schema
                .groups
                .iter()
                .map(|g| (g.to_string(), BTreeMap::default()))
                .collect(),
            variables,
            attributes: BTreeMap::default(),
        };

        let mut opts = OpenOptions::new();
        opts.write(true);
        if clobber {
            opts.create(true).truncate(true);
        } else {
            opts.create_new(true);
        }
        let file = opts.open(path)?;
        debug!(path = %path.display(), %level, "created product");

        let mut product = Product {
            path: path.to_path_buf(),
            schema,
            stored: schema.variables.iter().map(|v| (v.path, 0)).collect(),
            doc,
            file: Some(file),
            state: State::Open,
        };
        product.save()?;
        Ok(product)
    }

    /// Open an existing product to add data.
    ///
    /// Stored row counts start from the lengths already in the product.
    ///
    /// # Errors
    /// [Error::Io] or [Error::Json] if the product cannot be read, [Error::Format] if it
    /// does not contain the variables of its level.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let doc: Document = serde_json::from_reader(BufReader::new(&file))?;
        Self::from_document(path, doc, Some(file), State::Open)
    }

    /// Open an existing product for inspection. All writes fail with
    /// [Error::ReadOnlyProduct].
    ///
    /// # Errors
    /// See [Product::append].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let doc: Document = serde_json::from_reader(BufReader::new(file))?;
        Self::from_document(path, doc, None, State::ReadOnly)
    }

    fn from_document(path: &Path, doc: Document, file: Option<File>, state: State) -> Result<Self> {
        let schema = doc.level.schema();
        let mut stored = BTreeMap::default();
        for decl in schema.variables {
            let var = doc.variables.get(decl.path).ok_or_else(|| {
                Error::Format(format!("{} missing from {}", decl.path, path.display()))
            })?;
            stored.insert(decl.path, var.values.rows());
        }
        debug!(path = %path.display(), level = %doc.level, ?state, "opened product");
        Ok(Product {
            path: path.to_path_buf(),
            schema,
            doc,
            stored,
            file,
            state,
        })
    }

    fn save(&mut self) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &self.doc)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::ReadOnly => Err(Error::ReadOnlyProduct),
            State::Closed => Err(Error::ClosedProduct),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.doc.level
    }

    #[must_use]
    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Reference epoch of the time variables.
    #[must_use]
    pub fn epoch(&self) -> DateTime<Utc> {
        self.doc.epoch
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// # Errors
    /// [Error::UnknownDimension] if `name` is not a dimension of this product.
    pub fn dimension_len(&self, name: &str) -> Result<usize> {
        self.doc
            .dimensions
            .get(name)
            .map(|d| d.size)
            .ok_or_else(|| Error::UnknownDimension(name.to_string()))
    }

    pub fn dimensions(&self) -> impl Iterator<Item = (&str, &Dimension)> {
        self.doc.dimensions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Groups and their attributes.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, AttrValue>)> {
        self.doc.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.doc.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Global attributes.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.doc.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Write an attribute, global if `target` is `None`, otherwise attached to the group or
    /// variable at path `target`.
    ///
    /// # Errors
    /// [Error::UnknownTarget] if `target` is neither a group nor a variable,
    /// [Error::ClosedProduct] or [Error::ReadOnlyProduct] if the product does not accept
    /// writes.
    pub fn set_attr<V: Into<AttrValue>>(
        &mut self,
        name: &str,
        value: V,
        target: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        let value = value.into();
        let attrs = match target {
            None => &mut self.doc.attributes,
            Some(target) => {
                let target = normalize(target);
                if let Some(attrs) = self.doc.groups.get_mut(&target) {
                    attrs
                } else if let Some(var) = self.doc.variables.get_mut(&target) {
                    &mut var.attrs
                } else {
                    return Err(Error::UnknownTarget(target));
                }
            }
        };
        attrs.insert(name.to_string(), value);
        Ok(())
    }

    /// Read an attribute; byte strings are returned as text.
    ///
    /// # Errors
    /// [Error::UnknownTarget] if `target` is neither a group nor a variable.
    pub fn get_attr(&self, name: &str, target: Option<&str>) -> Result<Option<AttrValue>> {
        let attrs = match target {
            None => &self.doc.attributes,
            Some(target) => {
                let target = normalize(target);
                if let Some(attrs) = self.doc.groups.get(&target) {
                    attrs
                } else if let Some(var) = self.doc.variables.get(&target) {
                    &var.attrs
                } else {
                    return Err(Error::UnknownTarget(target));
                }
            }
        };
        Ok(attrs.get(name).cloned().map(AttrValue::decoded))
    }

    /// Write data to variable `name`.
    ///
    /// Variables with an unlimited first dimension take rows at `start`, or appended after
    /// the rows already stored if `start` is `None`. A value with one axis less than the
    /// variable is a single row. Other variables are overwritten as a whole. Data are cast
    /// to the variable's dtype.
    ///
    /// # Errors
    /// [Error::UnknownVariable] if `name` is not declared, [Error::Shape] if the data does
    /// not fit the variable's dimensions, [Error::ClosedProduct] or
    /// [Error::ReadOnlyProduct] if the product does not accept writes.
    pub fn write_variable<V: Into<Values>>(
        &mut self,
        name: &str,
        values: V,
        start: Option<usize>,
    ) -> Result<()> {
        self.check_writable()?;
        let path = normalize(name);
        let decl = self
            .schema
            .variable(&path)
            .ok_or_else(|| Error::UnknownVariable(path.clone()))?;
        let mut values = values.into().cast(decl.dtype);

        let sizes: Vec<Dimension> = decl
            .dims
            .iter()
            .map(|d| self.doc.dimensions.get(*d).copied())
            .collect::<Option<_>>()
            .ok_or_else(|| Error::UnknownDimension(decl.dims.join(",")))?;
        let unlimited = sizes.first().is_some_and(|d| d.unlimited);
        let var = self
            .doc
            .variables
            .get_mut(decl.path)
            .ok_or_else(|| Error::UnknownVariable(path.clone()))?;

        let rows = if unlimited {
            if values.ndim() + 1 == decl.dims.len() {
                values = values.into_row_block();
            }
            let trailing: Vec<usize> = sizes[1..].iter().map(|d| d.size).collect();
            if values.ndim() != decl.dims.len() || values.shape()[1..] != trailing[..] {
                let mut expected = vec![values.rows()];
                expected.extend(trailing);
                return Err(Error::Shape {
                    name: path,
                    expected,
                    actual: values.shape().to_vec(),
                });
            }
            let rows = values.rows();
            let start =
                start.unwrap_or_else(|| self.stored.get(decl.path).copied().unwrap_or_default());
            var.values.write_rows(decl.path, start, values)?;
            if let Some(dim) = self.doc.dimensions.get_mut(decl.dims[0]) {
                dim.size = dim.size.max(start + rows);
            }
            rows
        } else {
            let expected: Vec<usize> = sizes.iter().map(|d| d.size).collect();
            if values.shape() != expected {
                return Err(Error::Shape {
                    name: path,
                    expected,
                    actual: values.shape().to_vec(),
                });
            }
            let rows = values.rows();
            var.values = values;
            rows
        };

        if let Some(stored) = self.stored.get_mut(decl.path) {
            *stored += rows;
        }
        Ok(())
    }

    /// # Errors
    /// [Error::UnknownVariable] if `name` is not a variable of this product.
    pub fn get_variable(&self, name: &str) -> Result<&Values> {
        let path = normalize(name);
        self.doc
            .variables
            .get(&path)
            .map(|v| &v.values)
            .ok_or(Error::UnknownVariable(path))
    }

    /// Number of rows written to variable `name`.
    ///
    /// # Errors
    /// [Error::UnknownVariable] if `name` is not declared.
    pub fn stored(&self, name: &str) -> Result<usize> {
        let path = normalize(name);
        self.stored
            .get(path.as_str())
            .copied()
            .ok_or(Error::UnknownVariable(path))
    }

    /// Compare stored row counts with the dimensions they are checked against. Every
    /// mismatch is logged as a warning.
    pub fn check_stored(&self) -> Vec<StoredMismatch> {
        let mut mismatches = Vec::default();
        for check in self.schema.checks {
            let expected = self
                .doc
                .dimensions
                .get(check.dimension)
                .map_or(0, |d| d.size);
            for decl in self.schema.variables.iter().filter(|v| check.covers(v)) {
                let stored = self.stored.get(decl.path).copied().unwrap_or_default();
                if stored == expected || (check.allow_empty && stored == 0) {
                    continue;
                }
                warn!(
                    level = %self.schema.level,
                    variable = decl.path,
                    stored,
                    expected,
                    "size of variable is wrong"
                );
                mismatches.push(StoredMismatch {
                    variable: decl.path.to_string(),
                    dimension: check.dimension.to_string(),
                    stored,
                    expected,
                });
            }
        }
        mismatches
    }

    fn set_coverage(&mut self) {
        let name = self.schema.time_variable;
        let Some(var) = self.doc.variables.get(name) else {
            return;
        };
        let times = var.values.to_f64();
        let (Some(first), Some(last)) = (times.iter().next(), times.iter().last()) else {
            warn!(variable = name, "no time values stored; time coverage not set");
            return;
        };
        let start = coverage_time(self.doc.epoch, *first);
        let end = coverage_time(self.doc.epoch, *last);
        self.doc
            .attributes
            .insert("time_coverage_start".to_string(), AttrValue::Text(start));
        self.doc
            .attributes
            .insert("time_coverage_end".to_string(), AttrValue::Text(end));
    }

    /// Seal the product.
    ///
    /// Does nothing if already closed. A product with no rows along its primary dimension
    /// is written as is. Otherwise stored row counts are checked (mismatches are logged,
    /// not returned) and the time coverage attributes are derived from the first and last
    /// rows of the time variable.
    ///
    /// # Errors
    /// [Error::Io] or [Error::Json] if the product cannot be written. The product is
    /// closed regardless.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            State::Closed => return Ok(()),
            State::ReadOnly => {
                self.state = State::Closed;
                return Ok(());
            }
            State::Open => {}
        }
        self.state = State::Closed;

        let primary = self.dimension_len(self.schema.primary_dimension).unwrap_or_default();
        if primary == 0 {
            debug!(path = %self.path.display(), "closing empty product");
        } else {
            self.check_stored();
            self.set_coverage();
        }

        let zult = self.save();
        self.file = None;
        debug!(path = %self.path.display(), "closed product");
        zult
    }

    /// Write the global attributes describing the product.
    ///
    /// # Errors
    /// [Error::ClosedProduct] or [Error::ReadOnlyProduct] if the product does not accept
    /// writes.
    pub fn fill_global_attrs(&mut self, attrs: GlobalAttributes) -> Result<()> {
        let product_name = attrs.product_name.unwrap_or_else(|| {
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let platform = if attrs.inflight {
            "PACE"
        } else {
            "PACE (on-ground)"
        };

        self.set_attr("Conventions", "CF-1.6", None)?;
        self.set_attr("title", self.schema.title, None)?;
        self.set_attr("institution", "SRON Netherlands Institute for Space Research", None)?;
        self.set_attr("instrument", "SPEXone", None)?;
        self.set_attr("platform", platform, None)?;
        self.set_attr("processing_level", self.schema.level.to_string(), None)?;
        self.set_attr("product_name", product_name, None)?;
        self.set_attr("orbit_number", attrs.orbit_number, None)?;
        if let Some(bin_size) = attrs.bin_size {
            self.set_attr("bin_size_at_nadir", bin_size, None)?;
        }
        self.set_attr(
            "date_created",
            attrs
                .date_created
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            None,
        )?;
        self.set_attr("processing_version", env!("CARGO_PKG_VERSION"), None)?;
        Ok(())
    }
}

impl From<DimSize> for Dimension {
    fn from(size: DimSize) -> Self {
        match size {
            DimSize::Fixed(size) => Dimension {
                size,
                unlimited: false,
            },
            DimSize::Unlimited => Dimension {
                size: 0,
                unlimited: true,
            },
        }
    }
}

impl std::fmt::Debug for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Product")
            .field("path", &self.path)
            .field("level", &self.doc.level)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for Product {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(path = %self.path.display(), "failed to close product: {err}");
        }
    }
}
