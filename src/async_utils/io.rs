//! I/O utilities.
//!
//! This module is responsible for reading JSON and TOML configuration files,
//! and for reading plain line lists from files or standard input.

use tokio::{
    fs::File,
    io::{AsyncBufReadExt as _, AsyncRead, AsyncReadExt as _, BufReader},
};

use crate::{prelude::*, toml_utils::from_toml_str_with_serde};

/// Is this path a JSON file, judging by its extension?
fn is_json_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Read TOML or JSON from a file.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open file at path: {:?}", path))?;
    let mut data = String::new();
    // Read all at once because our parsing libraries don't do async I/O.
    file.read_to_string(&mut data)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    if is_json_path(path) {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        from_toml_str_with_serde(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Open either a [`Path`] or standard input.
async fn open_path_or_stdin(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncRead + Unpin + Send + 'static>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("Failed to open file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdin())),
    }
}

/// Read text lines from a file or stdin, exactly as they appear.
///
/// Trailing `\r` characters are removed, and lines that contain only
/// whitespace are skipped. Interior whitespace is preserved, because runs of
/// spaces and tabs carry column information.
#[instrument(level = "debug")]
pub async fn read_lines(path: Option<&Path>) -> Result<Vec<String>> {
    let reader = BufReader::new(open_path_or_stdin(path).await?);
    let mut lines = reader.lines();
    let mut output = vec![];
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read line from input")?
    {
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            output.push(line.to_owned());
        }
    }
    debug!(count = output.len(), "Read input lines");
    Ok(output)
}
