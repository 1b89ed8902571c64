use std::path::{Component, Path};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("relative path is empty")]
    Empty,
    #[error("relative path contains unsupported component: {0}")]
    UnsupportedComponent(String),
    #[error("path component is not valid UTF-8: {0}")]
    NonUtf8(String),
    #[error("link prefix cannot have path segments: {0}")]
    CannotBeABase(Url),
}

/// Builds the bookmark link for `relative` under `prefix`. Every component is
/// appended as its own percent-encoded path segment.
pub fn compose_link(prefix: &Url, relative: &Path) -> Result<Url, LinkError> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| LinkError::NonUtf8(part.to_string_lossy().into_owned()))?;
                segments.push(part);
            }
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(LinkError::UnsupportedComponent(
                    relative.display().to_string(),
                ));
            }
        }
    }
    if segments.is_empty() {
        return Err(LinkError::Empty);
    }

    let mut link = prefix.clone();
    {
        let mut path = link
            .path_segments_mut()
            .map_err(|_| LinkError::CannotBeABase(prefix.clone()))?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(link)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(value: &str) -> Url {
        Url::parse(value).unwrap()
    }

    #[test]
    fn appends_file_name_to_prefix_path() {
        let link = compose_link(&prefix("https://files.example/docs"), Path::new("a.pdf")).unwrap();
        assert_eq!(link.as_str(), "https://files.example/docs/a.pdf");
    }

    #[test]
    fn trailing_slash_does_not_double() {
        let link =
            compose_link(&prefix("https://files.example/docs/"), Path::new("a.pdf")).unwrap();
        assert_eq!(link.as_str(), "https://files.example/docs/a.pdf");

        let root = compose_link(&prefix("https://files.example"), Path::new("a.pdf")).unwrap();
        assert_eq!(root.as_str(), "https://files.example/a.pdf");
    }

    #[test]
    fn nested_relative_paths_become_segments() {
        let link = compose_link(
            &prefix("file:///srv/share"),
            Path::new("./papers/2024/x.pdf"),
        )
        .unwrap();
        assert_eq!(link.as_str(), "file:///srv/share/papers/2024/x.pdf");
    }

    #[test]
    fn reserved_characters_are_encoded() {
        let base = prefix("https://files.example/docs");
        let cases = [
            ("a b.pdf", "https://files.example/docs/a%20b.pdf"),
            ("100%.txt", "https://files.example/docs/100%25.txt"),
            ("what?.txt", "https://files.example/docs/what%3F.txt"),
            ("#1.txt", "https://files.example/docs/%231.txt"),
            ("a,b&c.txt", "https://files.example/docs/a,b&c.txt"),
        ];
        for (name, expected) in cases {
            let link = compose_link(&base, Path::new(name)).unwrap();
            assert_eq!(link.as_str(), expected, "name: {name}");
        }
    }

    #[test]
    fn query_of_prefix_is_kept() {
        let link =
            compose_link(&prefix("https://files.example/get?token=1"), Path::new("a")).unwrap();
        assert_eq!(link.as_str(), "https://files.example/get/a?token=1");
    }

    #[test]
    fn rejects_parent_dir_and_empty() {
        let base = prefix("https://files.example/docs");
        assert!(matches!(
            compose_link(&base, Path::new("../secret")),
            Err(LinkError::UnsupportedComponent(_))
        ));
        assert!(matches!(
            compose_link(&base, Path::new("")),
            Err(LinkError::Empty)
        ));
    }

    #[test]
    fn rejects_cannot_be_a_base_prefix() {
        assert!(matches!(
            compose_link(&prefix("mailto:someone@example.com"), Path::new("a")),
            Err(LinkError::CannotBeABase(_))
        ));
    }
}
