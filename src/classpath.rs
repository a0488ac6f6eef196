//! Lazily built index of the types declared on a classpath.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::classfile::{ClassFile, ClassFileError};

const REOBF_SUFFIX: &str = "_reobf.jar";
const REOBF_HINT: &str = "You need to reobfuscate before remapping against this jar.";

/// What the index knows about one declared type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// The type's internal name.
    pub name: String,
    /// The direct superclass, `None` for the root type or unknown types.
    pub super_name: Option<String>,
    /// The direct superinterfaces.
    pub interfaces: Vec<String>,
    /// Names of the declared fields.
    pub fields: HashSet<String>,
    /// Declared methods, name to descriptors.
    pub methods: HashMap<String, Vec<String>>,
    known: bool,
}

impl TypeDescriptor {
    /// Creates a descriptor for a type found on the classpath.
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            super_name,
            known: true,
            ..Default::default()
        }
    }

    /// The sentinel for a type not found in any classpath entry.
    ///
    /// It has no supertypes and declares nothing, which ends inheritance
    /// walks.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Extracts the supertypes and member signatures of a class file.
    pub fn from_class_bytes(bytes: &[u8]) -> Result<Self, ClassFileError> {
        let class = ClassFile::parse(bytes)?;
        let mut descriptor = Self::new(class.name()?, class.super_name()?.map(str::to_owned));
        descriptor.interfaces = class
            .interface_names()?
            .into_iter()
            .map(str::to_owned)
            .collect();
        for field in &class.fields {
            let (name, _) = class.member_signature(field)?;
            descriptor.fields.insert(name.to_owned());
        }
        for method in &class.methods {
            let (name, desc) = class.member_signature(method)?;
            descriptor.add_method(name, desc);
        }
        Ok(descriptor)
    }

    /// Adds a field declaration.
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into());
        self
    }

    /// Adds a method declaration.
    pub fn with_method(mut self, name: &str, descriptor: &str) -> Self {
        self.add_method(name, descriptor);
        self
    }

    /// Adds a direct superinterface.
    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    fn add_method(&mut self, name: &str, descriptor: &str) {
        self.methods
            .entry(name.to_owned())
            .or_default()
            .push(descriptor.to_owned());
    }

    /// Whether this is the "unknown external type" sentinel.
    pub fn is_unknown(&self) -> bool {
        !self.known
    }

    /// Whether the type itself declares a field called `name`.
    pub fn declares_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    /// Whether the type itself declares the method `name descriptor`.
    pub fn declares_method(&self, name: &str, descriptor: &str) -> bool {
        self.methods
            .get(name)
            .is_some_and(|descs| descs.iter().any(|d| d == descriptor))
    }
}

enum ClasspathSource {
    Directory(PathBuf),
    Archive {
        path: PathBuf,
        archive: Mutex<ZipArchive<File>>,
    },
}

impl ClasspathSource {
    fn open(path: &Path) -> Result<Self, UnresolvedClasspathEntry> {
        let hint = path
            .to_str()
            .filter(|path| path.ends_with(REOBF_SUFFIX))
            .map(|_| REOBF_HINT);
        let unresolved = |reason: String| UnresolvedClasspathEntry {
            path: path.to_path_buf(),
            reason,
            hint,
        };

        if path.is_dir() {
            return Ok(Self::Directory(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|err| unresolved(err.to_string()))?;
        let archive = ZipArchive::new(file).map_err(|err| unresolved(err.to_string()))?;
        Ok(Self::Archive {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
        })
    }

    fn path(&self) -> &Path {
        match self {
            Self::Directory(path) => path,
            Self::Archive { path, .. } => path,
        }
    }

    /// Reads `<name>.class`, `None` if this source does not contain it.
    fn read_class(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let entry_name = format!("{name}.class");
        match self {
            Self::Directory(root) => match fs::read(root.join(&entry_name)) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err),
            },
            Self::Archive { archive, .. } => {
                let mut archive = archive.lock().unwrap_or_else(PoisonError::into_inner);
                let mut entry = match archive.by_name(&entry_name) {
                    Ok(entry) => entry,
                    Err(ZipError::FileNotFound) => return Ok(None),
                    Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
                };
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
        }
    }
}

/// A classpath entry that could not be opened.
///
/// This is not fatal: the entry is left out and inheritance walks through
/// the types it would have provided end early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unresolved classpath entry {}: {reason}", .path.display())]
pub struct UnresolvedClasspathEntry {
    /// The classpath entry.
    pub path: PathBuf,
    /// Why it could not be opened.
    pub reason: String,
    /// How to produce the entry, when that is known.
    pub hint: Option<&'static str>,
}

/// Maps internal type names to their [`TypeDescriptor`]s.
///
/// Descriptors are loaded on first use from the first classpath entry
/// containing the type, and cached for the lifetime of the index.
pub struct ClasspathIndex {
    sources: Vec<ClasspathSource>,
    unresolved: Vec<UnresolvedClasspathEntry>,
    types: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
}

impl std::fmt::Debug for ClasspathIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClasspathIndex")
            .field(
                "sources",
                &self.sources.iter().map(ClasspathSource::path).collect::<Vec<_>>(),
            )
            .field("unresolved", &self.unresolved)
            .finish()
    }
}

impl Default for ClasspathIndex {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            unresolved: Vec::new(),
            types: RwLock::new(HashMap::new()),
        }
    }
}

impl ClasspathIndex {
    /// Opens the given directories and archives, in order.
    ///
    /// Entries that cannot be opened are logged and remembered in
    /// [`ClasspathIndex::unresolved`].
    pub fn open<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut index = Self::default();
        for path in paths {
            let path = path.as_ref();
            match ClasspathSource::open(path) {
                Ok(source) => {
                    tracing::debug!(path = %path.display(), "added classpath entry");
                    index.sources.push(source);
                }
                Err(err) => {
                    tracing::warn!(
                        path = %err.path.display(),
                        reason = %err.reason,
                        hint = err.hint,
                        "unresolved classpath entry"
                    );
                    index.unresolved.push(err);
                }
            }
        }
        index
    }

    /// Creates an index over already known types, without any classpath
    /// entries behind it.
    pub fn from_types<I>(types: I) -> Self
    where
        I: IntoIterator<Item = TypeDescriptor>,
    {
        let types = types
            .into_iter()
            .map(|ty| (ty.name.clone(), Arc::new(ty)))
            .collect();
        Self {
            types: RwLock::new(types),
            ..Default::default()
        }
    }

    /// The classpath entries that could not be opened.
    pub fn unresolved(&self) -> &[UnresolvedClasspathEntry] {
        &self.unresolved
    }

    /// Looks up the declaration of `name`.
    ///
    /// Types found nowhere on the classpath yield the
    /// [unknown sentinel](TypeDescriptor::unknown).
    pub fn declared_type(&self, name: &str) -> Arc<TypeDescriptor> {
        if let Some(ty) = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return ty.clone();
        }

        // loaded outside the lock, a racing thread may do the same work
        let loaded = Arc::new(self.load(name));
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_owned())
            .or_insert(loaded)
            .clone()
    }

    fn load(&self, name: &str) -> TypeDescriptor {
        if name.starts_with('[') {
            return TypeDescriptor::unknown(name);
        }

        for source in &self.sources {
            let bytes = match source.read_class(name) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(path = %source.path().display(), class = name, error = %err, "failed to read class");
                    continue;
                }
            };
            match TypeDescriptor::from_class_bytes(&bytes) {
                Ok(descriptor) => return descriptor,
                Err(err) => {
                    tracing::warn!(path = %source.path().display(), class = name, error = %err, "failed to parse class");
                }
            }
        }

        tracing::debug!(class = name, "unknown external type");
        TypeDescriptor::unknown(name)
    }
}
