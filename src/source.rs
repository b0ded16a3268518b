//! One scraped file and the fields read from it.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::field::{FieldId, FieldSpec};
use crate::{Error, Result};

/// A file plus its fields, kept in scan order.
///
/// Text fields are sorted by row and binary fields by byte offset, ties in
/// insertion order, so a single forward pass can match all of them.
#[derive(Debug)]
pub struct Source {
    path: PathBuf,
    handle: Option<File>,
    accessible: bool,
    text_fields: Vec<FieldSpec>,
    binary_fields: Vec<FieldSpec>,
}

impl Source {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: None,
            accessible: false,
            text_fields: Vec::new(),
            binary_fields: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text_fields(&self) -> &[FieldSpec] {
        &self.text_fields
    }

    pub fn binary_fields(&self) -> &[FieldSpec] {
        &self.binary_fields
    }

    /// All fields, text fields first.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.text_fields.iter().chain(self.binary_fields.iter())
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldSpec> {
        self.fields().find(|field| field.id == id)
    }

    pub fn field_mut(&mut self, id: FieldId) -> Option<&mut FieldSpec> {
        self.text_fields
            .iter_mut()
            .chain(self.binary_fields.iter_mut())
            .find(|field| field.id == id)
    }

    pub fn has_active_fields(&self) -> bool {
        self.fields().any(FieldSpec::is_active)
    }

    /// Insert `field` at its sorted position.
    ///
    /// # Errors
    ///
    /// - `Error::Config`: a field with the same name already reads this source
    /// - `Error::Alloc`: the field collection could not grow
    pub fn insert(&mut self, field: FieldSpec) -> Result<()> {
        if self.fields().any(|existing| existing.name == field.name) {
            return Err(Error::Config(format!(
                "field {:?} already defined for {}",
                field.name,
                self.path.display()
            )));
        }
        let fields = if field.is_binary() {
            &mut self.binary_fields
        } else {
            &mut self.text_fields
        };
        fields
            .try_reserve(1)
            .map_err(|_| Error::Alloc("source field list"))?;
        let key = field.scan_key();
        let at = fields.partition_point(|existing| existing.scan_key() <= key);
        fields.insert(at, field);
        Ok(())
    }

    /// Move the fields of a freshly parsed source for the same path into
    /// this one.
    pub fn merge(&mut self, other: Source) -> Result<()> {
        if other.path != self.path {
            return Err(Error::Config(format!(
                "cannot merge {} into {}",
                other.path.display(),
                self.path.display()
            )));
        }
        for field in other.text_fields.into_iter().chain(other.binary_fields) {
            self.insert(field)?;
        }
        Ok(())
    }

    /// Re-check readability and remember the answer.
    pub fn check_access(&mut self) -> bool {
        self.accessible = readable(&self.path);
        self.accessible
    }

    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    /// Position the (possibly cached) read handle at the start of the file
    /// and hand it out with the field lists.
    pub(crate) fn open_for_scan(&mut self) -> Result<(&mut File, &[FieldSpec], &[FieldSpec])> {
        if !self.accessible {
            return Err(Error::unavailable(&self.path, "not readable"));
        }
        let file = rewind_or_reopen(&mut self.handle, &self.path)?;
        Ok((file, &self.text_fields, &self.binary_fields))
    }
}

fn rewind_or_reopen<'a>(handle: &'a mut Option<File>, path: &Path) -> Result<&'a mut File> {
    let file = match handle.take() {
        Some(mut file) => match file.seek(SeekFrom::Start(0)) {
            Ok(_) => file,
            Err(err) => {
                log::warn!("seek to start of {} failed ({err}), reopening", path.display());
                drop(file);
                File::open(path).map_err(|err| Error::unavailable(path, err))?
            }
        },
        None => File::open(path).map_err(|err| Error::unavailable(path, err))?,
    };
    Ok(handle.insert(file))
}

#[cfg(unix)]
fn readable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}

#[cfg(not(unix))]
fn readable(path: &Path) -> bool {
    File::open(path).is_ok()
}
