//! In-memory container.
//!
//! Holds groups, attributes and datasets in ordered maps. Useful for
//! building synthetic chains and for exercising the reader without touching
//! the filesystem. Payloads may be stored in either byte order.

use std::collections::{BTreeMap, BTreeSet};

use super::{AttrValue, Container, ContainerSink, DatasetInfo, RawDataset};
use crate::dtype::TypedBuffer;
use crate::error::{ReadMpoError, Result};
use crate::layout::{join, normalize, split_last};

/// Container kept entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    groups: BTreeSet<String>,
    attrs: BTreeMap<String, BTreeMap<String, AttrValue>>,
    datasets: BTreeMap<String, RawDataset>,
}

impl Default for MemoryContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryContainer {
    /// An empty container with only the root group.
    pub fn new() -> Self {
        let mut groups = BTreeSet::new();
        groups.insert("/".to_string());
        Self {
            groups,
            attrs: BTreeMap::new(),
            datasets: BTreeMap::new(),
        }
    }

    /// Store a raw dataset as-is, keeping its byte order.
    ///
    /// The parent group is created if needed. An existing dataset at the
    /// same path is replaced.
    pub fn insert_raw_dataset(&mut self, path: &str, raw: RawDataset) -> Result<()> {
        let path = normalize(path);
        let (parent, _) = split_last(&path);
        self.create_group(&parent)?;
        if self.groups.contains(&path) {
            return Err(ReadMpoError::container(
                &path,
                "a group already exists at this path",
            ));
        }
        self.datasets.insert(path, raw);
        Ok(())
    }

    /// Remove an attribute. Returns the previous value.
    pub fn remove_attribute(&mut self, path: &str, name: &str) -> Option<AttrValue> {
        self.attrs.get_mut(&normalize(path))?.remove(name)
    }

    /// Remove a dataset. Returns the previous payload.
    pub fn remove_dataset(&mut self, path: &str) -> Option<RawDataset> {
        self.datasets.remove(&normalize(path))
    }

    /// Mutable access to a stored payload.
    pub fn dataset_mut(&mut self, path: &str) -> Option<&mut RawDataset> {
        self.datasets.get_mut(&normalize(path))
    }

    fn missing(path: &str, what: &str) -> ReadMpoError {
        ReadMpoError::container(path, format!("{} not found", what))
    }

    fn is_object(&self, path: &str) -> bool {
        self.groups.contains(path) || self.datasets.contains_key(path)
    }
}

impl Container for MemoryContainer {
    fn describe(&self) -> String {
        format!(
            "memory container ({} groups, {} datasets)",
            self.groups.len(),
            self.datasets.len()
        )
    }

    fn has_group(&self, path: &str) -> bool {
        self.groups.contains(&normalize(path))
    }

    fn has_dataset(&self, path: &str) -> bool {
        self.datasets.contains_key(&normalize(path))
    }

    fn list_children(&self, group: &str) -> Result<Vec<String>> {
        let group = normalize(group);
        if !self.groups.contains(&group) {
            return Err(Self::missing(&group, "group"));
        }
        let children: BTreeSet<String> = self
            .groups
            .iter()
            .filter(|p| p.as_str() != "/")
            .chain(self.datasets.keys())
            .filter_map(|p| {
                let (parent, name) = split_last(p);
                (parent == group).then(|| name.to_string())
            })
            .collect();
        Ok(children.into_iter().collect())
    }

    fn attribute_names(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize(path);
        if !self.is_object(&path) {
            return Err(Self::missing(&path, "object"));
        }
        Ok(self
            .attrs
            .get(&path)
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn read_attribute(&self, path: &str, name: &str) -> Result<AttrValue> {
        let path = normalize(path);
        self.attrs
            .get(&path)
            .and_then(|a| a.get(name))
            .cloned()
            .ok_or_else(|| Self::missing(&join(&path, name), "attribute"))
    }

    fn dataset_info(&self, path: &str) -> Result<DatasetInfo> {
        let path = normalize(path);
        let raw = self
            .datasets
            .get(&path)
            .ok_or_else(|| Self::missing(&path, "dataset"))?;
        Ok(DatasetInfo {
            dtype: raw.dtype,
            shape: raw.shape.clone(),
        })
    }

    fn read_dataset(&self, path: &str) -> Result<RawDataset> {
        let path = normalize(path);
        self.datasets
            .get(&path)
            .cloned()
            .ok_or_else(|| Self::missing(&path, "dataset"))
    }
}

impl ContainerSink for MemoryContainer {
    fn create_group(&mut self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut current = String::from("/");
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = join(&current, part);
            if self.datasets.contains_key(&current) {
                return Err(ReadMpoError::container(
                    &current,
                    "a dataset already exists at this path",
                ));
            }
            self.groups.insert(current.clone());
        }
        Ok(())
    }

    fn write_attribute(&mut self, path: &str, name: &str, value: &AttrValue) -> Result<()> {
        let path = normalize(path);
        if !self.is_object(&path) {
            return Err(Self::missing(&path, "object"));
        }
        self.attrs
            .entry(path)
            .or_default()
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn write_dataset(&mut self, path: &str, data: &TypedBuffer) -> Result<()> {
        self.insert_raw_dataset(path, RawDataset::from_buffer(data, vec![data.len()]))
    }
}
