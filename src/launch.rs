//! Resolves the set of commands to guard: either a single argv override, or
//! every executable regular file in the well-known directory, launched in
//! lexicographic order for reproducible startup logs.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{Error, Result};

pub fn resolve(argv: &[String], dir: &Path) -> Result<Vec<Vec<String>>> {
    if argv.len() > 1 {
        return Ok(vec![argv[1..].to_vec()]);
    }

    let mut entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) => {
            return Err(Error::CommandDir {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut commands = Vec::new();
    while let Some(entry) = entries.next().transpose()? {
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_file() && is_executable(&metadata) {
            commands.push(path.to_string_lossy().into_owned());
        }
    }
    commands.sort();

    if commands.is_empty() {
        return Err(Error::NoCommands(dir.to_path_buf()));
    }

    Ok(commands.into_iter().map(|cmd| vec![cmd]).collect())
}

fn is_executable(metadata: &fs::Metadata) -> bool {
    metadata.permissions().mode() & 0o111 != 0
}

/// Renders a command the way the diagnostic contract expects: a Python-style
/// list-of-strings repr, e.g. `['/bin/true', 'arg']`.
pub fn format_command(command: &[String]) -> String {
    let quoted: Vec<String> = command.iter().map(|arg| format!("'{arg}'")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Renders the whole resolved command set the way `Starting commands: ...` expects.
pub fn format_commands(commands: &[Vec<String>]) -> String {
    let rendered: Vec<String> = commands.iter().map(|c| format_command(c)).collect();
    format!("[{}]", rendered.join(", "))
}
