//! Storage of filters, images and reports as dense arrays with a shape sidecar.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use crate::correlation::CorrelationTable;
use crate::error::PersistenceError;


/// Extension of the dense little endian `f64` value file
pub const VALUES_EXTENSION: &str = "bin";
/// Extension of the shape sidecar
pub const SHAPE_EXTENSION: &str = "json";

/// Shape sidecar stored next to every array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayHeader {
    /// Array dimensions, values are stored in row-major order
    pub shape: Vec<usize>,
    /// Encoding of the value file
    pub dtype: String,
}

impl ArrayHeader {
    fn for_array(array: &ArrayD<f64>) -> Self {
        ArrayHeader { shape: array.shape().to_vec(), dtype: String::from("<f8") }
    }

    fn len(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Destination for arrays and reports produced by the filters and optimizers,
/// paths are relative to wherever the sink is rooted
pub trait ArraySink: Send + Sync {
    /// Durably stores an array under the relative path
    fn store_array(&self, relative_path: &str, array: &ArrayD<f64>) -> Result<(), PersistenceError>;
    /// Stores a plain text file (readmes and summaries)
    fn store_text(&self, relative_path: &str, contents: &str) -> Result<(), PersistenceError>;
    /// Stores a `neuron,correlation` csv table
    fn store_correlations(&self, relative_path: &str, table: &CorrelationTable) -> Result<(), PersistenceError>;
}

/// Sink writing into a directory on disk, an array `name` is written as `name.bin`
/// with its shape in `name.json`
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Creates the root directory if it does not exist yet
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, PersistenceError> {
        fs::create_dir_all(root.as_ref())?;

        Ok(DirectorySink { root: root.as_ref().to_path_buf() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sink rooted at a subdirectory of this one
    pub fn child(&self, name: &str) -> Result<Self, PersistenceError> {
        DirectorySink::new(self.root.join(name))
    }

    fn prepare(&self, relative_path: &str) -> Result<PathBuf, PersistenceError> {
        let path = self.root.join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(path)
    }
}

fn with_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);

    PathBuf::from(name)
}

impl ArraySink for DirectorySink {
    fn store_array(&self, relative_path: &str, array: &ArrayD<f64>) -> Result<(), PersistenceError> {
        let path = self.prepare(relative_path)?;

        let mut values = BufWriter::new(File::create(with_extension(&path, VALUES_EXTENSION))?);
        for value in array.iter() {
            values.write_all(&value.to_le_bytes())?;
        }
        values.flush()?;

        let header = File::create(with_extension(&path, SHAPE_EXTENSION))?;
        serde_json::to_writer(BufWriter::new(header), &ArrayHeader::for_array(array))?;

        log::debug!("Stored array of shape {:?} at {}", array.shape(), path.display());

        Ok(())
    }

    fn store_text(&self, relative_path: &str, contents: &str) -> Result<(), PersistenceError> {
        let path = self.prepare(relative_path)?;
        fs::write(path, contents)?;

        Ok(())
    }

    fn store_correlations(&self, relative_path: &str, table: &CorrelationTable) -> Result<(), PersistenceError> {
        let path = self.prepare(relative_path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        for (neuron, correlation) in table {
            writer.write_record(&[neuron.to_string(), correlation.to_string()])?;
        }
        writer.flush()?;

        Ok(())
    }
}

/// Loads an array stored by [`DirectorySink`], `path` is given without extension
pub fn load_array<P: AsRef<Path>>(path: P) -> Result<ArrayD<f64>, PersistenceError> {
    let path = path.as_ref();

    let header: ArrayHeader = serde_json::from_reader(
        BufReader::new(File::open(with_extension(path, SHAPE_EXTENSION))?)
    )?;

    let mut bytes = Vec::new();
    BufReader::new(File::open(with_extension(path, VALUES_EXTENSION))?).read_to_end(&mut bytes)?;

    let values: Vec<f64> = bytes.chunks_exact(8)
        .map(|chunk| {
            let mut buffer = [0u8; 8];
            buffer.copy_from_slice(chunk);

            f64::from_le_bytes(buffer)
        })
        .collect();

    if values.len() != header.len() || bytes.len() % 8 != 0 {
        return Err(PersistenceError::ShapeFileMismatch { expected: header.len(), found: values.len() });
    }

    ArrayD::from_shape_vec(IxDyn(&header.shape), values)
        .map_err(|_| PersistenceError::ShapeFileMismatch { expected: header.len(), found: bytes.len() / 8 })
}

/// Loads a correlation table written by [`ArraySink::store_correlations`]
pub fn load_correlations<P: AsRef<Path>>(path: P) -> Result<CorrelationTable, PersistenceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    let mut table = CorrelationTable::new();
    for record in reader.deserialize::<(usize, f64)>() {
        let (neuron, correlation) = record?;
        table.insert(neuron, correlation);
    }

    Ok(table)
}

/// Sink keeping everything in memory, used when results only need to be inspected
#[derive(Debug, Default)]
pub struct MemorySink {
    arrays: Mutex<HashMap<String, ArrayD<f64>>>,
    texts: Mutex<HashMap<String, String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn array(&self, relative_path: &str) -> Option<ArrayD<f64>> {
        self.arrays.lock().ok()?.get(relative_path).cloned()
    }

    pub fn text(&self, relative_path: &str) -> Option<String> {
        self.texts.lock().ok()?.get(relative_path).cloned()
    }

    /// Relative paths of every stored array, sorted
    pub fn array_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = match self.arrays.lock() {
            Ok(arrays) => arrays.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        paths.sort();

        paths
    }
}

fn poisoned() -> PersistenceError {
    PersistenceError::Io(std::io::Error::new(std::io::ErrorKind::Other, "Memory sink lock poisoned"))
}

impl ArraySink for MemorySink {
    fn store_array(&self, relative_path: &str, array: &ArrayD<f64>) -> Result<(), PersistenceError> {
        self.arrays.lock()
            .map_err(|_| poisoned())?
            .insert(relative_path.to_string(), array.clone());

        Ok(())
    }

    fn store_text(&self, relative_path: &str, contents: &str) -> Result<(), PersistenceError> {
        self.texts.lock()
            .map_err(|_| poisoned())?
            .insert(relative_path.to_string(), contents.to_string());

        Ok(())
    }

    fn store_correlations(&self, relative_path: &str, table: &CorrelationTable) -> Result<(), PersistenceError> {
        let contents: String = table.iter()
            .map(|(neuron, correlation)| format!("{},{}\n", neuron, correlation))
            .collect();

        self.store_text(relative_path, &contents)
    }
}
