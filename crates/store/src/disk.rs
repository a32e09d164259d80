// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! On-disk print store.
//!
//! Prints live under `<base>/<driver-id as 4 hex>/<devtype as 8 hex>/<finger as 1 hex>`,
//! where `<base>` defaults to `$HOME/.fprint/prints`. Directories are created with mode
//! 0700. Discovery only walks the directory layout; a discovered print may still fail to
//! parse when actually loaded.

use std::fs;
use std::path::{Path, PathBuf};

use fprint_error::{Code, Error};
use fprint_logger as log;

use crate::{Finger, PrintData};

/// Permissions of created store directories.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// A print store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct PrintStore {
    base: PathBuf,
}

/// A print found by scanning the store layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPrint {
    /// Id of the driver the print belongs to.
    pub driver_id: u16,

    /// Device type the print is tied to.
    pub devtype: u32,

    /// Finger the print was enrolled for.
    pub finger: Finger,

    /// Path of the print file.
    pub path: PathBuf,
}

impl DiscoveredPrint {
    /// Loads the discovered print from disk.
    pub fn load(&self) -> Result<PrintData, Error> {
        load_file(&self.path)
    }

    /// Removes the discovered print from disk.
    pub fn delete(&self) -> Result<(), Error> {
        log::debug!("removing print at {}", self.path.display());
        Ok(fs::remove_file(&self.path)?)
    }
}

fn load_file(path: &Path) -> Result<PrintData, Error> {
    log::debug!("loading print from {}", path.display());
    let contents = fs::read(path)?;
    PrintData::parse(&contents)
}

fn create_dir_all(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path)
}

impl PrintStore {
    /// Opens the default store under the user's home directory.
    pub fn new() -> Result<Self, Error> {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| Error::user(Code::NotFound))?;
        Ok(PrintStore { base: home.join(".fprint").join("prints") })
    }

    /// Opens a store rooted at an explicit directory.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        PrintStore { base: base.into() }
    }

    fn device_dir(&self, driver_id: u16, devtype: u32) -> PathBuf {
        self.base.join(format!("{driver_id:04x}")).join(format!("{devtype:08x}"))
    }

    fn print_path(&self, driver_id: u16, devtype: u32, finger: Finger) -> PathBuf {
        self.device_dir(driver_id, devtype).join(format!("{:x}", u8::from(finger)))
    }

    /// Saves a print for a finger, overwriting any previous one.
    pub fn save(&self, print: &PrintData, finger: Finger) -> Result<(), Error> {
        let path = self.print_path(print.driver_id, print.devtype, finger);
        create_dir_all(path.parent().unwrap())?;
        log::debug!("saving to {}", path.display());
        Ok(fs::write(path, print.serialize())?)
    }

    /// Loads the print stored for a finger.
    ///
    /// Fails with a not-found error when no print was saved for that finger.
    pub fn load(
        &self, driver_id: u16, devtype: u32, finger: Finger,
    ) -> Result<PrintData, Error> {
        load_file(&self.print_path(driver_id, devtype, finger))
    }

    /// Removes the print stored for a finger.
    pub fn delete(&self, driver_id: u16, devtype: u32, finger: Finger) -> Result<(), Error> {
        let path = self.print_path(driver_id, devtype, finger);
        log::debug!("removing finger {finger:?} at {}", path.display());
        Ok(fs::remove_file(path)?)
    }

    /// Scans the store and lists every print previously saved.
    ///
    /// Entries that do not follow the layout (wrong name length, non-hex names, reserved
    /// finger 0) are skipped.
    pub fn discover(&self) -> Result<Vec<DiscoveredPrint>, Error> {
        let mut prints = Vec::new();
        for driver_entry in read_dir_or_empty(&self.base)? {
            let Some(driver_id) = parse_hex_name::<u16>(&driver_entry, 4) else { continue };
            for dev_entry in read_dir_or_empty(&driver_entry)? {
                let Some(devtype) = parse_hex_name::<u32>(&dev_entry, 8) else { continue };
                for print_entry in read_dir_or_empty(&dev_entry)? {
                    let Some(finger) = parse_hex_name::<u8>(&print_entry, 1)
                        .and_then(|value| Finger::try_from(value).ok())
                    else {
                        log::debug!("skipping print file {}", print_entry.display());
                        continue;
                    };
                    prints.push(DiscoveredPrint {
                        driver_id,
                        devtype,
                        finger,
                        path: print_entry,
                    });
                }
            }
        }
        Ok(prints)
    }
}

/// Lists a directory, treating a missing one as empty.
fn read_dir_or_empty(path: &Path) -> Result<Vec<PathBuf>, Error> {
    match fs::read_dir(path) {
        Ok(entries) => {
            let mut paths: Vec<PathBuf> =
                entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
            paths.sort();
            Ok(paths)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Parses a path's file name as fixed-width lowercase hex.
fn parse_hex_name<T: TryFrom<u64>>(path: &Path, width: usize) -> Option<T> {
    let name = path.file_name()?.to_str()?;
    if name.len() != width {
        return None;
    }
    let value = u64::from_str_radix(name, 16).ok()?;
    T::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use crate::PrintDataType;

    use super::*;

    fn sample_print() -> PrintData {
        let mut print = PrintData::new(0x1234, 0xaabbccdd, PrintDataType::Minutiae);
        print.items.push(vec![1, 2, 3]);
        print
    }

    #[test]
    fn save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrintStore::with_base(dir.path());
        let print = sample_print();
        store.save(&print, Finger::RightIndex).unwrap();

        let loaded = store.load(0x1234, 0xaabbccdd, Finger::RightIndex).unwrap();
        assert_eq!(loaded, print);

        store.delete(0x1234, 0xaabbccdd, Finger::RightIndex).unwrap();
        let error = store.load(0x1234, 0xaabbccdd, Finger::RightIndex).unwrap_err();
        assert_eq!(error, Error::world(Code::NotFound));
    }

    #[test]
    fn layout_uses_hex_components() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrintStore::with_base(dir.path());
        store.save(&sample_print(), Finger::RightIndex).unwrap();
        assert!(dir.path().join("1234").join("aabbccdd").join("7").is_file());
    }

    #[test]
    fn discover_finds_saved_prints_and_skips_strays() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrintStore::with_base(dir.path());
        store.save(&sample_print(), Finger::LeftThumb).unwrap();
        store.save(&sample_print(), Finger::RightLittle).unwrap();
        // Strays: reserved finger 0 and a misnamed directory.
        fs::write(dir.path().join("1234").join("aabbccdd").join("0"), b"x").unwrap();
        fs::create_dir_all(dir.path().join("junk")).unwrap();

        let prints = store.discover().unwrap();
        let fingers: Vec<_> = prints.iter().map(|p| p.finger).collect();
        assert_eq!(fingers, [Finger::LeftThumb, Finger::RightLittle]);
        assert_eq!(prints[0].load().unwrap(), sample_print());
    }

    #[test]
    fn discover_on_missing_base_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrintStore::with_base(dir.path().join("nonexistent"));
        assert_eq!(store.discover().unwrap(), Vec::new());
    }

    #[cfg(unix)]
    #[test]
    fn directories_are_created_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = PrintStore::with_base(dir.path().join("prints"));
        store.save(&sample_print(), Finger::LeftIndex).unwrap();
        let mode = fs::metadata(dir.path().join("prints").join("1234"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
