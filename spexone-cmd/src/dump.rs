use std::collections::BTreeMap;
use std::io::stdout;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spexone::product::{AttrValue, Dimension, Dtype, StoredMismatch};
use spexone::{Level, Product};

#[derive(Debug, Serialize)]
struct VariableInfo<'a> {
    dtype: Dtype,
    dims: &'a [String],
    shape: Vec<usize>,
    stored: usize,
    attrs: BTreeMap<&'a str, AttrValue>,
}

#[derive(Debug, Serialize)]
struct Dump<'a> {
    path: &'a Path,
    level: Level,
    epoch: DateTime<Utc>,
    dimensions: BTreeMap<&'a str, &'a Dimension>,
    groups: BTreeMap<&'a str, BTreeMap<&'a str, AttrValue>>,
    variables: BTreeMap<&'a str, VariableInfo<'a>>,
    attributes: BTreeMap<&'a str, AttrValue>,
    mismatches: Vec<StoredMismatch>,
}

fn decoded<'a>(
    attrs: impl IntoIterator<Item = (&'a String, &'a AttrValue)>,
) -> BTreeMap<&'a str, AttrValue> {
    attrs
        .into_iter()
        .map(|(k, v)| (k.as_str(), v.clone().decoded()))
        .collect()
}

/// True if `path` is `target` or lies below it.
fn selected(path: &str, target: Option<&str>) -> bool {
    match target {
        None => true,
        Some(target) => {
            let target = target.trim_end_matches('/');
            path == target
                || path
                    .strip_prefix(target)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
    }
}

fn build<'a>(product: &'a Product, target: Option<&str>) -> Result<Dump<'a>> {
    let target = target.map(|t| {
        if t.starts_with('/') {
            t.to_string()
        } else {
            format!("/{t}")
        }
    });
    let target = target.as_deref();

    let mut variables = BTreeMap::default();
    for (name, var) in product.variables().filter(|(n, _)| selected(n, target)) {
        variables.insert(
            name,
            VariableInfo {
                dtype: var.values.dtype(),
                dims: &var.dims,
                shape: var.values.shape().to_vec(),
                stored: product.stored(name).context("variable without row count")?,
                attrs: decoded(&var.attrs),
            },
        );
    }
    let groups: BTreeMap<_, _> = product
        .groups()
        .filter(|(n, _)| selected(n, target))
        .map(|(n, attrs)| (n, decoded(attrs)))
        .collect();
    if let Some(target) = target {
        if variables.is_empty() && groups.is_empty() {
            bail!("{target} is neither a group nor a variable");
        }
    }

    Ok(Dump {
        path: product.path(),
        level: product.level(),
        epoch: product.epoch(),
        dimensions: product.dimensions().collect(),
        groups,
        variables,
        attributes: if target.is_none() {
            product
                .attributes()
                .map(|(k, v)| (k, v.clone().decoded()))
                .collect()
        } else {
            BTreeMap::default()
        },
        mismatches: product.check_stored(),
    })
}

pub fn dump(fpath: &Path, target: Option<&str>) -> Result<()> {
    let product = Product::open(fpath).with_context(|| format!("opening {fpath:?}"))?;
    let dump = build(&product, target)?;
    serde_json::to_writer_pretty(stdout(), &dump).context("serializing to json")?;
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use spexone::product::DimSize;

    fn product(dir: &Path) -> Product {
        let epoch = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        let mut l1a = Product::create(
            dir.join("dump.json"),
            Level::L1A,
            epoch,
            &[("samples_per_image", DimSize::Fixed(2))],
        )
        .unwrap();
        l1a.write_variable("/science_data/detector_images", vec![1u16, 2], None)
            .unwrap();
        l1a.write_variable("/image_attributes/image_time", 1.5, None)
            .unwrap();
        l1a
    }

    #[test]
    fn test_selected() {
        assert!(selected("/science_data/detector_images", None));
        assert!(selected("/science_data/detector_images", Some("/science_data")));
        assert!(selected("/science_data/detector_images", Some("/science_data/")));
        assert!(!selected("/science_data_x/y", Some("/science_data")));
        assert!(selected("/science_data", Some("/science_data")));
    }

    #[test]
    fn dump_group() {
        let dir = tempfile::tempdir().unwrap();
        let l1a = product(dir.path());

        let dump = build(&l1a, Some("science_data")).unwrap();

        assert_eq!(dump.variables.len(), 1);
        let var = &dump.variables["/science_data/detector_images"];
        assert_eq!(var.stored, 1);
        assert_eq!(var.shape, vec![1, 2]);
        assert!(dump.groups.contains_key("/science_data"));
        assert!(dump.attributes.is_empty());
    }

    #[test]
    fn dump_unknown_target() {
        let dir = tempfile::tempdir().unwrap();
        let l1a = product(dir.path());

        assert!(build(&l1a, Some("/no_such_group")).is_err());
    }
}
