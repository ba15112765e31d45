// DBGp Client - Remote Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Conversion between local paths and the `file://` URIs engines use.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::ProtocolError;

/// Escaped `file://` URI for an absolute path.
pub fn file_uri(path: &Path) -> Result<String, ProtocolError> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| ProtocolError::InvalidPath(path.display().to_string()))
}

/// Path of a `file://` URI.
pub fn path_from_uri(uri: &str) -> Result<PathBuf, ProtocolError> {
    let url = Url::parse(uri).map_err(|_| ProtocolError::InvalidPath(uri.to_string()))?;
    if url.scheme() != "file" {
        return Err(ProtocolError::InvalidPath(uri.to_string()));
    }
    url.to_file_path().map_err(|_| ProtocolError::InvalidPath(uri.to_string()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_file_uri_escapes() {
        assert_eq!(file_uri(Path::new("/var/www/index.php")).unwrap(), "file:///var/www/index.php");
        assert_eq!(
            file_uri(Path::new("/home/me/my site/a#b.php")).unwrap(),
            "file:///home/me/my%20site/a%23b.php"
        );
    }

    #[test]
    fn test_relative_path_rejected() {
        assert!(matches!(file_uri(Path::new("index.php")), Err(ProtocolError::InvalidPath(_))));
    }

    #[test]
    fn test_path_from_uri() {
        assert_eq!(
            path_from_uri("file:///home/me/my%20site/a.php").unwrap(),
            PathBuf::from("/home/me/my site/a.php")
        );
        assert!(path_from_uri("dbgp://1").is_err());
        assert!(path_from_uri("not a uri").is_err());
    }

    #[test]
    fn test_round_trip() {
        let path = Path::new("/srv/ünïcode dir/x.php");
        assert_eq!(path_from_uri(&file_uri(path).unwrap()).unwrap(), path);
    }
}
