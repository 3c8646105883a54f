use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::info;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;

use crate::solution::Solution;

/// Writes a gzip-compressed bincode snapshot of the solution.
pub fn write_solution<W: Write>(solution: &Solution, out: W) -> std::io::Result<()> {
    let encoder = GzEncoder::new(out, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serialize_into(&mut writer, solution)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?;
    Ok(())
}

pub fn read_solution<R: Read>(input: R) -> std::io::Result<Solution> {
    let decoder = GzDecoder::new(input);
    let mut reader = BufReader::new(decoder);

    deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Saves the solution to `filename`, stamping the save time.
pub fn save_solution(solution: &mut Solution, filename: impl AsRef<Path>) -> std::io::Result<()> {
    solution.saved_at = Some(chrono::Utc::now());
    let file = File::create(filename.as_ref())?;
    write_solution(solution, file)?;
    info!("saved solution {} to {}", solution.id, filename.as_ref().display());
    Ok(())
}

/// Load a solution snapshot written by [`save_solution`]
///
/// # Examples
/// ```no_run
/// use valuecalc::saving::load_solution;
///
/// match load_solution("solution.bin.gz") {
///     Ok(solution) => println!("Loaded {}", solution.name),
///     Err(e) => eprintln!("Failed to load snapshot: {}", e),
/// }
/// ```
pub fn load_solution(filename: impl AsRef<Path>) -> std::io::Result<Solution> {
    let file = File::open(filename.as_ref())?;
    let solution = read_solution(file)?;
    info!("loaded solution {} from {}", solution.id, filename.as_ref().display());
    Ok(solution)
}

pub fn serialize_to_memory(solution: &Solution) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_solution(solution, &mut buffer)?;
    Ok(buffer)
}

pub fn deserialize_from_memory(buffer: &[u8]) -> std::io::Result<Solution> {
    read_solution(Cursor::new(buffer))
}
