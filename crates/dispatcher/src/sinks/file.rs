//! FileSink - appends merged halves to a file

use contracts::{ContractError, DataSink, MergedHalf};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// On-disk encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileFormat {
    /// One JSON object per line
    #[default]
    Jsonl,
    /// u32 little-endian length prefix followed by a bincode record
    Bincode,
}

impl FileFormat {
    pub fn parse(value: &str) -> io::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "jsonl" | "json" => Ok(Self::Jsonl),
            "bincode" | "bin" => Ok(Self::Bincode),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown file format '{other}', expected jsonl or bincode"),
            )),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Bincode => "bin",
        }
    }
}

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file
    pub path: PathBuf,
    /// Encoding
    pub format: FileFormat,
}

impl FileSinkConfig {
    /// Create config from params map.
    ///
    /// `path` names the file directly; otherwise a timestamped file is
    /// created under `dir` (default `./output`).
    pub fn from_params(params: &HashMap<String, String>) -> io::Result<Self> {
        let format = match params.get("format") {
            Some(value) => FileFormat::parse(value)?,
            None => FileFormat::default(),
        };
        let path = match params.get("path") {
            Some(path) => PathBuf::from(path),
            None => {
                let dir = params
                    .get("dir")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./output"));
                dir.join(default_file_name(format))
            }
        };
        Ok(Self { path, format })
    }
}

fn default_file_name(format: FileFormat) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    format!("merged-{stamp}.{}", format.extension())
}

/// Sink that writes merged halves to a file
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: BufWriter<File>,
    written: u64,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> io::Result<Self> {
        let config = FileSinkConfig::from_params(params)?;
        Self::new(name, config)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn encode_half(&mut self, half: &MergedHalf) -> io::Result<()> {
        match self.config.format {
            FileFormat::Jsonl => {
                serde_json::to_writer(&mut self.writer, half)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                self.writer.write_all(b"\n")
            }
            FileFormat::Bincode => {
                let bytes = bincode::serialize(half)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                self.writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
                self.writer.write_all(&bytes)
            }
        }
    }

    fn persist_half(&mut self, half: &MergedHalf) -> Result<(), ContractError> {
        self.encode_half(half).map_err(|e| {
            error!(sink = %self.name, sequence = half.sequence, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })?;
        self.written += 1;
        Ok(())
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, half),
        fields(sink = %self.name, sequence = half.sequence)
    )]
    async fn write(&mut self, half: &MergedHalf) -> Result<(), ContractError> {
        self.persist_half(half)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.writer
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.writer
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        debug!(
            sink = %self.name,
            path = %self.config.path.display(),
            halves = self.written,
            "FileSink closed"
        );
        Ok(())
    }
}

/// Read back a file written by [`FileSink`].
pub fn read_halves(path: impl AsRef<Path>, format: FileFormat) -> io::Result<Vec<MergedHalf>> {
    let file = File::open(path)?;
    let mut halves = Vec::new();
    match format {
        FileFormat::Jsonl => {
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let half = serde_json::from_str(&line)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                halves.push(half);
            }
        }
        FileFormat::Bincode => {
            let mut reader = BufReader::new(file);
            let mut prefix = [0u8; 4];
            loop {
                match reader.read_exact(&mut prefix) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e),
                }
                let mut record = vec![0u8; u32::from_le_bytes(prefix) as usize];
                reader.read_exact(&mut record)?;
                let half = bincode::deserialize(&record)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                halves.push(half);
            }
        }
    }
    Ok(halves)
}
