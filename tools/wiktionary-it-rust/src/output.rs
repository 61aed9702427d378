//! Lexicon persistence: one JSON object, optionally bzip2-compressed.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use tracing::info;

use crate::error::Result;
use crate::record::Lexicon;

const WRITE_BUFFER: usize = 256 * 1024;
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Compress when asked to, or when the output path already says `.bz2`.
pub fn wants_compression(path: &Path, compress: bool) -> bool {
    compress || path.extension().is_some_and(|ext| ext == "bz2")
}

pub fn to_writer(lexicon: &Lexicon, writer: impl Write) -> Result<()> {
    serde_json::to_writer(writer, lexicon)?;
    Ok(())
}

/// Write the lexicon to `path` as JSON.
pub fn write_lexicon(lexicon: &Lexicon, path: &Path, compress: bool) -> Result<()> {
    let writer = BufWriter::with_capacity(WRITE_BUFFER, File::create(path)?);

    if wants_compression(path, compress) {
        let mut encoder = BzEncoder::new(writer, Compression::best());
        to_writer(lexicon, &mut encoder)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = writer;
        to_writer(lexicon, &mut writer)?;
        writer.flush()?;
    }

    info!(path = %path.display(), entries = lexicon.len(), "lexicon written");
    Ok(())
}

/// Read a lexicon written by [`write_lexicon`]; bzip2 is detected from the
/// stream header, not the file name.
pub fn read_lexicon(path: &Path) -> Result<Lexicon> {
    let mut reader = BufReader::new(File::open(path)?);
    let compressed = reader.fill_buf()?.starts_with(BZIP2_MAGIC);

    let reader: Box<dyn Read> = if compressed {
        Box::new(MultiBzDecoder::new(reader))
    } else {
        Box::new(reader)
    };
    Ok(serde_json::from_reader(reader)?)
}

/// Rewrite a (possibly compressed) lexicon as plain JSON. Returns the entry count.
pub fn decompress(input: &Path, output: &Path) -> Result<usize> {
    let lexicon = read_lexicon(input)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER, File::create(output)?);
    to_writer(&lexicon, &mut writer)?;
    writer.flush()?;
    Ok(lexicon.len())
}
