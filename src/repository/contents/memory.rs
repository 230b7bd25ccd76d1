// src/repository/contents/memory.rs

use super::{ContentMapping, package_name};
use crate::error::Result;
use crate::repository::Location;
use crate::repository::index::index_arch;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Contents mapping held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryContents {
    location: Location,
    arch: String,
    /// file → qualified package entries
    files: BTreeMap<String, BTreeSet<String>>,
    /// base package name → files
    packages: HashMap<String, BTreeSet<String>>,
    /// base package name → last qualified entry seen
    fullnames: HashMap<String, String>,
}

impl MemoryContents {
    pub fn new(location: Location) -> Self {
        let location = location.without_gz();
        let arch = index_arch(&location.to_string());
        Self {
            location,
            arch,
            files: BTreeMap::new(),
            packages: HashMap::new(),
            fullnames: HashMap::new(),
        }
    }

    fn forget_package_if_empty(&mut self, name: &str) {
        if self.packages.get(name).is_some_and(BTreeSet::is_empty) {
            self.packages.remove(name);
            self.fullnames.remove(name);
        }
    }
}

impl ContentMapping for MemoryContents {
    fn location(&self) -> &Location {
        &self.location
    }

    fn arch(&self) -> &str {
        &self.arch
    }

    fn add_entry(&mut self, file: &str, package: &str) -> Result<()> {
        let name = package_name(package);
        self.files
            .entry(file.to_string())
            .or_default()
            .insert(package.to_string());
        self.packages
            .entry(name.to_string())
            .or_default()
            .insert(file.to_string());
        self.fullnames.insert(name.to_string(), package.to_string());
        Ok(())
    }

    fn add_package(&mut self, package: &str, files: &[String]) -> Result<()> {
        self.remove_package(package_name(package))?;
        for file in files {
            self.add_entry(file, package)?;
        }
        Ok(())
    }

    fn remove_package(&mut self, name: &str) -> Result<bool> {
        let Some(files) = self.packages.remove(name) else {
            return Ok(false);
        };
        self.fullnames.remove(name);

        for file in files {
            if let Some(entries) = self.files.get_mut(&file) {
                entries.retain(|p| package_name(p) != name);
                if entries.is_empty() {
                    self.files.remove(&file);
                }
            }
        }
        Ok(true)
    }

    fn remove_file(&mut self, file: &str) -> Result<bool> {
        let Some(entries) = self.files.remove(file) else {
            return Ok(false);
        };

        for package in entries {
            let name = package_name(&package);
            if let Some(files) = self.packages.get_mut(name) {
                files.remove(file);
            }
            self.forget_package_if_empty(name);
        }
        Ok(true)
    }

    fn files_of_package(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .packages
            .get(name)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn packages_of_file(&self, file: &str) -> Result<Vec<String>> {
        Ok(self
            .files
            .get(file)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn package_fullname(&self, name: &str) -> Result<Option<String>> {
        Ok(self.fullnames.get(name).cloned())
    }

    fn entries(&self) -> Result<Vec<(String, Vec<String>)>> {
        Ok(self
            .files
            .iter()
            .map(|(file, entries)| (file.clone(), entries.iter().cloned().collect()))
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.files.len())
    }
}
