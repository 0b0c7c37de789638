/// A file inside an addressables bundle, written as `archive:/<CAB>/<file>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivePath<'a> {
    /// Name of the bundle's main serialized file, which identifies the bundle
    pub bundle: &'a str,
    pub file: &'a str,
}
impl std::fmt::Display for ArchivePath<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "archive:/{}/{}", self.bundle, self.file)
    }
}

impl<'a> ArchivePath<'a> {
    /// The main serialized file of a bundle, which is named like the bundle's CAB.
    pub fn same(cab: &'a str) -> Self {
        ArchivePath { bundle: cab, file: cab }
    }

    /// `Ok(None)` for paths without the `archive:` scheme. Both separators are accepted.
    pub fn try_parse(path: &'a str) -> Result<Option<ArchivePath<'a>>, InvalidArchivePath> {
        let Some(inner) = path.strip_prefix("archive:") else {
            return Ok(None);
        };

        let mut parts = inner.split(['/', '\\']).filter(|part| !part.is_empty());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(bundle), Some(file), None) => Ok(Some(ArchivePath { bundle, file })),
            _ => Err(InvalidArchivePath(path.to_owned())),
        }
    }
}

#[derive(Debug)]
pub struct InvalidArchivePath(String);
impl std::fmt::Display for InvalidArchivePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid archive path: `{}`", self.0)
    }
}
impl std::error::Error for InvalidArchivePath {}
