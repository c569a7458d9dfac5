use anyhow::Result;
use grep_cli::stdout;
use gzp::{deflate::Gzip, Compression, ZBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use termcolor::ColorChoice;

/// Build a TSV writer targeting a file or stdout ("-") with optional gzip
/// compression.
pub fn get_writer<P: AsRef<Path>>(
    path: &Option<P>,
    gzipped: bool,
    write_headers: bool,
    threads: usize,
    compression_level: u32,
) -> Result<csv::Writer<Box<dyn Write>>> {
    let raw_writer = match path {
        Some(path) if path.as_ref().to_str() != Some("-") => maybe_gzip(
            BufWriter::new(File::create(path)?),
            gzipped,
            threads,
            compression_level,
        ),
        _ => maybe_gzip(
            stdout(ColorChoice::Never),
            gzipped,
            threads,
            compression_level,
        ),
    };

    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(write_headers)
        .from_writer(raw_writer))
}

fn maybe_gzip<W: Write + Send + 'static>(
    writer: W,
    gzipped: bool,
    threads: usize,
    compression_level: u32,
) -> Box<dyn Write> {
    if gzipped {
        Box::new(
            ZBuilder::<Gzip, _>::new()
                .num_threads(threads)
                .compression_level(Compression::new(compression_level))
                .from_writer(writer),
        )
    } else {
        Box::new(writer)
    }
}
