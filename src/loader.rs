//! Locating and loading the mapping files of a build variant.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::mapping::{MappingSource, MappingSyntax};
use crate::table::MappingTable;

/// The build variant a mapping set belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The client jar.
    Client,
    /// The dedicated server jar.
    Server,
    /// Client and server merged (Forge 1.4.6 and later).
    Universal,
    /// Client and server packaged together (Forge 1.4.5 and earlier).
    UniversalOld,
}

impl Side {
    /// All sides, in presentation order.
    pub const ALL: [Side; 4] = [Side::Universal, Side::Client, Side::Server, Side::UniversalOld];

    /// The symbol file this side requires inside the `conf` directory.
    pub fn srg_name(self) -> &'static str {
        match self {
            Side::Client => "client.srg",
            Side::Server => "server.srg",
            Side::Universal => "joined.srg",
            Side::UniversalOld => "packaged.srg",
        }
    }

    /// The archives, relative to the MCP directory, that make up this side's
    /// classpath.
    pub fn default_classpath(self) -> &'static [&'static str] {
        match self {
            Side::Client => &["jars/bin/minecraft.jar"],
            Side::Server => &["jars/minecraft_server.jar"],
            Side::Universal | Side::UniversalOld => {
                &["jars/bin/minecraft.jar", "jars/minecraft_server.jar"]
            }
        }
    }

    /// What to tell the user when [`Side::srg_name`] is missing.
    pub fn missing_file_hint(self) -> &'static str {
        match self {
            Side::Client | Side::Server => {
                "If you're using Forge, set the side to Universal (1.4.6+) or Universal_old (1.4.5 and earlier)."
            }
            Side::Universal => {
                "If you're not using Forge, set the side to Client or Server.\nIf you're using Forge on 1.4.5 or earlier, set the side to Universal_old."
            }
            Side::UniversalOld => "If you're not using Forge, set the side to Client or Server.",
        }
    }

    /// Whether a name table row tagged with `side` (0 client, 1 server,
    /// 2 both) applies.
    fn accepts(self, side: u8) -> bool {
        match self {
            Side::Client => side == 0 || side == 2,
            Side::Server => side == 1 || side == 2,
            Side::Universal | Side::UniversalOld => true,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Client => "client",
            Side::Server => "server",
            Side::Universal => "universal",
            Side::UniversalOld => "universal_old",
        })
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Side::Client),
            "server" => Ok(Side::Server),
            "universal" | "joined" => Ok(Side::Universal),
            "universal_old" | "universal-old" | "packaged" => Ok(Side::UniversalOld),
            other => Err(format!("unknown side `{other}`")),
        }
    }
}

/// Which way the mapping is applied.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Obfuscated names to readable names.
    #[default]
    Deobfuscate,
    /// Readable names back to obfuscated names.
    Reobfuscate,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deobfuscate" | "deobf" => Ok(Direction::Deobfuscate),
            "reobfuscate" | "reobf" => Ok(Direction::Reobfuscate),
            other => Err(format!("unknown direction `{other}`")),
        }
    }
}

/// Loads the mapping table of one side from an MCP `conf` directory.
#[derive(Clone, Debug)]
pub struct MappingLoader {
    conf_dir: PathBuf,
    side: Side,
    syntax: MappingSyntax,
    direction: Direction,
}

impl MappingLoader {
    /// Creates a loader for `side`.
    ///
    /// `mapping_dir` may be the MCP directory itself (containing `conf/`) or
    /// the directory holding the mapping files.
    pub fn new(mapping_dir: impl AsRef<Path>, side: Side) -> Self {
        let mapping_dir = mapping_dir.as_ref();
        let conf = mapping_dir.join("conf");
        let conf_dir = if conf.is_dir() {
            conf
        } else {
            mapping_dir.to_path_buf()
        };

        Self {
            conf_dir,
            side,
            syntax: MappingSyntax::default(),
            direction: Direction::default(),
        }
    }

    /// Uses a different line grammar for the symbol file.
    pub fn with_syntax(mut self, syntax: MappingSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Loads the inverse table when reobfuscating.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// The directory the mapping files are read from.
    pub fn conf_dir(&self) -> &Path {
        &self.conf_dir
    }

    /// Path of the side's symbol file.
    pub fn srg_path(&self) -> PathBuf {
        self.conf_dir.join(self.side.srg_name())
    }

    /// Reads and parses all mapping files of the side.
    ///
    /// Fails with [`Error::MissingMappingFile`] if the side's symbol file does
    /// not exist and with [`Error::MalformedMappingLine`] on the first line
    /// that does not parse. The optional `fields.csv` and `methods.csv` name
    /// tables are applied when present.
    pub fn load(&self) -> Result<MappingTable, Error> {
        let path = self.srg_path();
        if !path.is_file() {
            return Err(Error::MissingMappingFile {
                path,
                side: self.side,
                hint: self.side.missing_file_hint(),
            });
        }

        let bytes = fs::read(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        let source = MappingSource::new(&bytes, self.syntax);

        let mut table = MappingTable::new();
        for record in source.iter() {
            let record = record.map_err(|err| Error::MalformedMappingLine {
                path: path.clone(),
                line_number: err.line_number(),
                line: String::from_utf8_lossy(err.line()).into_owned(),
                reason: err.to_string(),
            })?;
            table.insert_record(&record);
        }
        tracing::info!(
            path = %path.display(),
            rules = table.len(),
            conflicts = table.conflicts(),
            "loaded symbol mappings"
        );

        let fields = self.read_names("fields.csv")?;
        let methods = self.read_names("methods.csv")?;
        if !fields.is_empty() || !methods.is_empty() {
            table.rename_members(&fields, &methods);
        }

        Ok(match self.direction {
            Direction::Deobfuscate => table,
            Direction::Reobfuscate => table.inverse(),
        })
    }

    fn read_names(&self, file_name: &str) -> Result<HashMap<String, String>, Error> {
        let path = self.conf_dir.join(file_name);
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no name table");
            return Ok(HashMap::new());
        }

        let contents = fs::read(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        let names = parse_names(&String::from_utf8_lossy(&contents), self.side);
        tracing::info!(path = %path.display(), names = names.len(), "loaded name table");
        Ok(names)
    }
}

/// Parses `searge,name,side,desc` rows of an MCP name table.
fn parse_names(contents: &str, side: Side) -> HashMap<String, String> {
    let mut names = HashMap::new();
    for line in contents.lines() {
        let mut columns = line.split(',').map(|column| column.trim().trim_matches('"'));
        let (Some(searge), Some(name)) = (columns.next(), columns.next()) else {
            continue;
        };
        if searge.is_empty() || name.is_empty() || searge == "searge" {
            continue;
        }
        if let Some(Ok(row_side)) = columns.next().map(str::parse::<u8>) {
            if !side.accepts(row_side) {
                continue;
            }
        }
        names.insert(searge.to_string(), name.to_string());
    }
    names
}
