use std::{
    collections::{hash_map::Entry, HashMap},
    path::{Path, PathBuf},
};

use crate::{
    convert::{skeletal_import, SkeletalImport},
    error::Result,
    format::{
        ogf::{OgfModel, OgfOptions},
        scene::{ClassRegistry, LoadReport, Scene},
    },
    util::file::map_file,
};

/// State shared by the imports of one batch: the class registry, decode
/// options and every OGF model decoded so far, keyed by path.
///
/// Nothing outlives the session; dropping it releases the cache.
pub struct ImportSession {
    registry: ClassRegistry,
    options: OgfOptions,
    models: HashMap<PathBuf, OgfModel>,
}

impl Default for ImportSession {
    fn default() -> Self { Self::new(ClassRegistry::default(), OgfOptions::default()) }
}

impl ImportSession {
    pub fn new(registry: ClassRegistry, options: OgfOptions) -> Self {
        Self { registry, options, models: HashMap::new() }
    }

    pub fn registry(&self) -> &ClassRegistry { &self.registry }

    pub fn options(&self) -> &OgfOptions { &self.options }

    /// Decodes an OGF file, or returns the model decoded earlier for the
    /// same path.
    pub fn import_ogf<P: AsRef<Path>>(&mut self, path: P) -> Result<&OgfModel> {
        let path = path.as_ref();
        match self.models.entry(path.to_path_buf()) {
            Entry::Occupied(e) => {
                log::debug!("Using cached model '{}'", path.display());
                Ok(e.into_mut())
            }
            Entry::Vacant(e) => {
                let data = map_file(path)?;
                let model = OgfModel::decode(&data, &self.options)?;
                log::info!(
                    "Imported '{}': {} bones, {} elements",
                    path.display(),
                    model.bones.len(),
                    model.elements.len()
                );
                Ok(e.insert(model))
            }
        }
    }

    pub fn import_skeletal<P: AsRef<Path>>(&mut self, path: P) -> Result<SkeletalImport> {
        skeletal_import(self.import_ogf(path)?)
    }

    pub fn load_scene<P: AsRef<Path>>(&self, path: P) -> Result<(Scene, LoadReport)> {
        Scene::load(path, &self.registry)
    }

    pub fn cached_models(&self) -> usize { self.models.len() }
}

impl Drop for ImportSession {
    fn drop(&mut self) {
        log::debug!("Releasing import session ({} cached models)", self.models.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn failed_import_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ogf");
        std::fs::write(&path, [0u8; 4]).unwrap();

        let mut session = ImportSession::default();
        assert!(matches!(session.import_ogf(&path), Err(Error::MalformedContainer { .. })));
        assert!(matches!(
            session.import_ogf(dir.path().join("absent.ogf")),
            Err(Error::Io { .. })
        ));
        assert_eq!(session.cached_models(), 0);
    }
}
