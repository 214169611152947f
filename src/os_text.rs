//! Lossless encoding of OS strings and paths
//!
//! File names are not guaranteed to be UTF-8. Names that are valid UTF-8 are
//! written as plain strings; anything else is written as its raw bytes so it
//! reads back unchanged. Use with `#[serde(with = "crate::os_text")]`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::string::FromUtf8Error;

#[derive(Deserialize)]
#[serde(untagged)]
enum OsText {
    Text(String),
    Bytes(Vec<u8>),
}

pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<OsStr> + ?Sized,
    S: Serializer,
{
    let value = value.as_ref();
    match value.to_str() {
        Some(text) => serializer.serialize_str(text),
        None => serializer.collect_seq(to_bytes(value).iter()),
    }
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: From<OsString>,
    D: Deserializer<'de>,
{
    match OsText::deserialize(deserializer)? {
        OsText::Text(text) => Ok(T::from(OsString::from(text))),
        OsText::Bytes(bytes) => from_bytes(bytes).map(T::from).map_err(D::Error::custom),
    }
}

/// Raw bytes of an OS string
#[cfg(unix)]
pub fn to_bytes(value: &OsStr) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(value.as_bytes())
}

/// Raw bytes of an OS string
#[cfg(not(unix))]
pub fn to_bytes(value: &OsStr) -> Cow<'_, [u8]> {
    match value.to_string_lossy() {
        Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
        Cow::Owned(text) => Cow::Owned(text.into_bytes()),
    }
}

/// Rebuild an OS string from the bytes [`to_bytes`] produced
#[cfg(unix)]
pub fn from_bytes(bytes: Vec<u8>) -> Result<OsString, FromUtf8Error> {
    use std::os::unix::ffi::OsStringExt;
    Ok(OsString::from_vec(bytes))
}

/// Rebuild an OS string from the bytes [`to_bytes`] produced
///
/// Only UTF-8 is accepted off unix.
#[cfg(not(unix))]
pub fn from_bytes(bytes: Vec<u8>) -> Result<OsString, FromUtf8Error> {
    String::from_utf8(bytes).map(OsString::from)
}

/// The same encoding for a list of paths
pub mod list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::path::{Path, PathBuf};

    struct Encoded<'a>(&'a Path);

    impl Serialize for Encoded<'_> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            super::serialize(self.0, serializer)
        }
    }

    struct Decoded(PathBuf);

    impl<'de> Deserialize<'de> for Decoded {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            super::deserialize(deserializer).map(Decoded)
        }
    }

    pub fn serialize<S: Serializer>(paths: &[PathBuf], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(paths.iter().map(|path| Encoded(path.as_path())))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PathBuf>, D::Error> {
        let decoded: Vec<Decoded> = Vec::deserialize(deserializer)?;
        Ok(decoded.into_iter().map(|Decoded(path)| path).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::path::PathBuf;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Named {
        #[serde(with = "crate::os_text")]
        path: PathBuf,
        #[serde(with = "crate::os_text::list")]
        more: Vec<PathBuf>,
    }

    #[test]
    fn test_utf8_paths_stay_strings() {
        let named = Named {
            path: PathBuf::from("/data/a.txt"),
            more: vec![PathBuf::from("/data/b")],
        };
        let json = serde_json::to_string(&named).unwrap();
        assert_eq!(json, r#"{"path":"/data/a.txt","more":["/data/b"]}"#);
        assert_eq!(serde_json::from_str::<Named>(&json).unwrap(), named);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_survive_json() {
        use std::os::unix::ffi::OsStrExt;

        let bad = PathBuf::from(OsStr::from_bytes(b"/data/bad\xff.txt"));
        let named = Named {
            path: bad.clone(),
            more: vec![bad.clone(), PathBuf::from("/data/ok")],
        };
        let json = serde_json::to_string(&named).unwrap();
        assert!(json.contains("255"));

        let back: Named = serde_json::from_str(&json).unwrap();
        assert_eq!(back, named);
        assert_eq!(back.path.as_os_str().as_bytes(), b"/data/bad\xff.txt");
    }

    #[test]
    fn test_bytes_round_trip() {
        let value = OsStr::new("plain");
        let bytes = to_bytes(value).into_owned();
        assert_eq!(from_bytes(bytes).unwrap(), value.to_os_string());
    }
}
