//! Linearize a PDF file and check the result
//!
//! Usage: cargo run --example linearize -- input.pdf output.pdf

use pdflin::linearization::check;
use pdflin::PdfProcessor;
use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <input.pdf> <output.pdf>", args[0]);
        process::exit(1);
    }

    let mut processor = PdfProcessor::new();
    if processor.read(&args[1]).is_ok() {
        processor.set_linearization(true);
        if processor.init_write_memory().is_ok() {
            let _ = processor.write();
        }
    }

    while let Some(warning) = processor.next_warning() {
        println!("warning: {warning}");
    }
    if let Some(error) = processor.drain_last_error() {
        eprintln!("error: {error}");
        process::exit(2);
    }

    let Some(bytes) = processor.get_buffer() else {
        eprintln!("error: nothing was written");
        process::exit(2);
    };
    let report = check(bytes);
    println!(
        "{} pages, {} bytes, linearization {}",
        report.parameters.as_ref().map_or(0, |p| p.page_count),
        bytes.len(),
        if report.is_ok() { "ok" } else { "FAILED" }
    );
    for problem in &report.problems {
        println!("  {problem}");
    }

    if let Err(e) = pdflin::writer::write_file(bytes, args[2].as_ref()) {
        eprintln!("error: {e}");
        process::exit(2);
    }
}
