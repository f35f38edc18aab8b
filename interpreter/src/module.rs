use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;

/// Where a `USE NAME` statement found its target on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum Module {
    /// A source file whose statements are parsed in place of the `USE`.
    Source { path: PathBuf, text: String },
    /// A shell script that runs when the `USE` statement executes.
    Script(PathBuf),
}

pub trait ModuleLoader {
    fn resolve(&self, name: &str) -> Result<Option<Module>, Error>;
}

/// Resolves modules against a list of directories, first match wins. A `.bas` file is preferred
/// over a `.sh` script of the same name.
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    search_paths: Vec<PathBuf>,
}

pub const PATH_VARIABLE: &str = "BASIC_PATH";

impl FsLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        FsLoader { search_paths }
    }

    /// Searches `base` (usually the directory of the running program), then the working
    /// directory, then every directory listed in `BASIC_PATH`.
    pub fn from_env(base: Option<&Path>) -> Self {
        let mut search_paths = Vec::new();
        if let Some(base) = base {
            search_paths.push(base.to_path_buf());
        }
        search_paths.push(PathBuf::from("."));
        if let Some(paths) = env::var_os(PATH_VARIABLE) {
            search_paths.extend(env::split_paths(&paths));
        }
        FsLoader { search_paths }
    }

    fn find(&self, name: &str, extension: &str) -> Option<PathBuf> {
        let candidates = [name.to_string(), name.to_ascii_lowercase()];
        self.search_paths.iter().find_map(|dir| {
            candidates
                .iter()
                .map(|stem| dir.join(format!("{}.{}", stem, extension)))
                .find(|path| path.is_file())
        })
    }
}

impl ModuleLoader for FsLoader {
    fn resolve(&self, name: &str) -> Result<Option<Module>, Error> {
        if let Some(path) = self.find(name, "bas") {
            debug!(name, path = %path.display(), "resolved source module");
            let text = fs::read_to_string(&path)?;
            return Ok(Some(Module::Source { path, text }));
        }

        Ok(self.find(name, "sh").map(|path| {
            debug!(name, path = %path.display(), "resolved script module");
            Module::Script(path)
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use crate::module::{FsLoader, Module, ModuleLoader};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("basic-module-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_source_preferred_over_script() {
        let dir = scratch_dir("prefer");
        fs::write(dir.join("util.bas"), "X = 1\n").unwrap();
        fs::write(dir.join("util.sh"), "true\n").unwrap();
        fs::write(dir.join("tool.sh"), "true\n").unwrap();

        let loader = FsLoader::new(vec![dir.clone()]);
        assert_eq!(
            loader.resolve("UTIL").unwrap(),
            Some(Module::Source {
                path: dir.join("util.bas"),
                text: String::from("X = 1\n"),
            })
        );
        assert_eq!(
            loader.resolve("TOOL").unwrap(),
            Some(Module::Script(dir.join("tool.sh")))
        );
        assert_eq!(loader.resolve("MISSING").unwrap(), None);

        fs::remove_dir_all(dir).unwrap();
    }
}
