//! Owned argument vectors for ensemble members.

use crate::error::{Error, Result};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Program name used when the session was not started from a real argv.
pub const DEFAULT_PROGRAM_NAME: &str = "a.out";

/// A conventional `argc`/`argv` pair: slot 0 is the program name, slots
/// `1..=N` the ensemble's arguments.
///
/// Besides the Rust view ([`as_slice`](Self::as_slice)), a NUL-terminated
/// pointer array is kept alongside for handing to C argument parsers. Its
/// storage lives exactly as long as the `ArgVector`.
pub struct ArgVector {
    args: Vec<String>,
    // Owns the bytes `pointers` refers to
    c_args: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl ArgVector {
    /// Build the vector from a program name and the ensemble's arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any string contains a NUL byte.
    pub fn new(program_name: &str, arguments: &[String]) -> Result<Self> {
        let args: Vec<String> = std::iter::once(program_name.to_string())
            .chain(arguments.iter().cloned())
            .collect();

        let c_args = args
            .iter()
            .map(|a| {
                CString::new(a.as_bytes()).map_err(|_| {
                    Error::Configuration(format!("argument {a:?} contains a NUL byte"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut pointers: Vec<*const c_char> = c_args.iter().map(|c| c.as_ptr()).collect();
        pointers.push(std::ptr::null());

        Ok(ArgVector {
            args,
            c_args,
            pointers,
        })
    }

    /// Number of entries, program name included.
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// The program name (slot 0).
    pub fn program_name(&self) -> &str {
        &self.args[0]
    }

    /// The ensemble's arguments (program name excluded).
    pub fn arguments(&self) -> &[String] {
        &self.args[1..]
    }

    /// All entries, program name first.
    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    /// Entries as C strings, program name first.
    pub fn as_c_strs(&self) -> impl Iterator<Item = &CStr> {
        self.c_args.iter().map(CString::as_c_str)
    }

    /// Pointer to a NULL-terminated `char *argv[]` array.
    ///
    /// Valid while `self` is alive and not moved out of its owner; the
    /// pointed-to strings must not be written through.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }

    /// Iterate over the entries as `&str`, e.g. for `clap::Parser::parse_from`.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(String::as_str)
    }
}

impl std::fmt::Debug for ArgVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.args).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn slot_zero_is_program_name() {
        let argv = ArgVector::new("./sim", &strings(&["--mode", "fast"])).unwrap();
        assert_eq!(argv.argc(), 3);
        assert_eq!(argv.argc(), argv.arguments().len() + 1);
        assert_eq!(argv.program_name(), "./sim");
        assert_eq!(argv.as_slice(), &strings(&["./sim", "--mode", "fast"])[..]);
        assert_eq!(argv.iter().collect::<Vec<_>>(), vec!["./sim", "--mode", "fast"]);
    }

    #[test]
    fn empty_argument_list() {
        let argv = ArgVector::new(DEFAULT_PROGRAM_NAME, &[]).unwrap();
        assert_eq!(argv.argc(), 1);
        assert!(argv.arguments().is_empty());
    }

    #[test]
    fn c_view_is_null_terminated() {
        let argv = ArgVector::new("prog", &strings(&["x", "yz"])).unwrap();
        let ptr = argv.as_ptr();
        let collected: Vec<String> = (0..argv.argc())
            .map(|i| unsafe { CStr::from_ptr(*ptr.add(i)) }.to_string_lossy().into_owned())
            .collect();
        assert_eq!(collected, strings(&["prog", "x", "yz"]));
        assert!(unsafe { *ptr.add(argv.argc()) }.is_null());
        assert_eq!(argv.as_c_strs().count(), 3);
    }

    #[test]
    fn nul_byte_is_rejected() {
        let err = ArgVector::new("prog", &strings(&["bad\0arg"])).unwrap_err();
        assert!(err.is_configuration());
    }
}
