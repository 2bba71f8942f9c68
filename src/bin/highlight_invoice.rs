//! CLI tool for highlighting timekeepers and Adjustments and Credit blocks

use invoice_highlighter::{default_output_path, highlight_invoice, HighlightError, HighlightOptions};
use std::env;
use std::path::{Path, PathBuf};
use std::process;

struct Args {
    input: PathBuf,
    output: PathBuf,
    json: bool,
    options: HighlightOptions,
}

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} <input.pdf> [output.pdf] [--platform NAME] [--title TEXT] [--opacity A] [--padding P] [--json]",
        program
    );
    eprintln!();
    eprintln!("Highlights each timekeeper name and its Adjustments and Credit block");
    eprintln!("in a shared color. Output defaults to <input>.highlighted.pdf.");
    process::exit(1);
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut input = None;
    let mut output = None;
    let mut json = false;
    let mut options = HighlightOptions::default();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match arg.as_str() {
            "--json" => json = true,
            "--platform" => {
                options.platform = value("--platform")?
                    .parse()
                    .map_err(|e: HighlightError| e.to_string())?
            }
            "--title" => options.title = Some(value("--title")?),
            "--opacity" => {
                let a: f32 = value("--opacity")?
                    .parse()
                    .map_err(|_| "--opacity expects a number".to_string())?;
                options.opacity = Some(a);
            }
            "--padding" => {
                options.padding = value("--padding")?
                    .parse()
                    .map_err(|_| "--padding expects a number".to_string())?
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag)),
            path if input.is_none() => input = Some(PathBuf::from(path)),
            path if output.is_none() => output = Some(PathBuf::from(path)),
            extra => return Err(format!("unexpected argument {}", extra)),
        }
    }

    let input = input.ok_or_else(|| "missing input file".to_string())?;
    let output = output.unwrap_or_else(|| default_output_path(&input));
    Ok(Args {
        input,
        output,
        json,
        options,
    })
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let argv: Vec<String> = env::args().collect();
    if argv.len() < 2 {
        usage(&argv[0]);
    }

    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            usage(&argv[0]);
        }
    };

    if !Path::new(&args.input).exists() {
        eprintln!("Error: input file {} does not exist", args.input.display());
        process::exit(1);
    }

    match highlight_invoice(&args.input, &args.output, &args.options) {
        Ok(report) => {
            if args.json {
                let keepers: Vec<String> = report
                    .keepers
                    .iter()
                    .map(|(key, color)| {
                        format!(
                            r#"{{"name":"{}","color":"{}"}}"#,
                            json_escape(key.as_str()),
                            color.to_hex()
                        )
                    })
                    .collect();
                println!(
                    r#"{{"input":"{}","output":"{}","pdf_type":"{}","page_count":{},"line_items":{},"highlights":{},"outline_fallbacks":{},"skipped_regions":{},"degraded_names":{},"processing_time_ms":{},"keepers":[{}]}}"#,
                    json_escape(&args.input.display().to_string()),
                    json_escape(&args.output.display().to_string()),
                    report.pdf_type.as_str(),
                    report.page_count,
                    report.line_items,
                    report.highlights,
                    report.outline_fallbacks,
                    report.skipped_regions,
                    report.degraded_names,
                    report.processing_time_ms,
                    keepers.join(",")
                );
            } else {
                println!(
                    "Successfully processed {} -> {}",
                    args.input.display(),
                    args.output.display()
                );
                println!("Pages: {}", report.page_count);
                println!("Line items with adjustments: {}", report.line_items);
                println!(
                    "Highlights: {} ({} outline fallbacks)",
                    report.highlights, report.outline_fallbacks
                );
                for (key, color) in &report.keepers {
                    println!("  {} {}", color, key);
                }
                println!("Processing time: {}ms", report.processing_time_ms);
            }
        }
        Err(e @ (HighlightError::NotImplemented(_) | HighlightError::NoTextLayer(_))) => {
            if args.json {
                println!(r#"{{"error":"{}"}}"#, json_escape(&e.to_string()));
            } else {
                eprintln!("{}", e);
            }
            process::exit(2);
        }
        Err(e) => {
            if args.json {
                println!(r#"{{"error":"{}"}}"#, json_escape(&e.to_string()));
            } else {
                eprintln!("Error: {}", e);
            }
            process::exit(1);
        }
    }
}
