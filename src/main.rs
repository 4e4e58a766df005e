use std::env;
use std::path;
use std::process;

use mzimport::{ImportMethod, MzDataImportMethod, MzMLImportMethod, RawDataFile};

fn summarize(file: &RawDataFile) {
    println!(
        "{}: {} scans, {} chromatograms",
        file.name(),
        file.scan_count(),
        file.chromatogram_count()
    );
    for scan in file.scans() {
        println!(
            "  #{} {} level={:?} rt={:?}s points={} tic={:.3e}",
            scan.scan_number(),
            scan.native_id(),
            scan.ms_level(),
            scan.retention_time(),
            scan.num_data_points(),
            scan.tic(),
        );
    }
    for chromatogram in file.chromatograms() {
        println!(
            "  chromatogram #{} {} points={}",
            chromatogram.chromatogram_number(),
            chromatogram.native_id(),
            chromatogram.num_data_points(),
        );
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: mzimport <path.mzML|path.mzData>");
        process::exit(2);
    }
    let path = path::Path::new(&args[1]);
    let is_mzdata = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("mzdata"))
        .unwrap_or(false);

    let outcome = if is_mzdata {
        MzDataImportMethod::new(path).execute()
    } else {
        MzMLImportMethod::new(path).execute()
    };

    match outcome {
        Ok(Some(file)) => summarize(&file),
        Ok(None) => println!("Import was cancelled"),
        Err(e) => {
            eprintln!("Import failed: {e}");
            process::exit(1);
        }
    }
}
