//! html2pdf – command-line editor HTML → PDF converter.
//!
//! Usage:
//!   html2pdf [flags] <input.html> <output.pdf> [baseUrl|-]
//!
//! Exit codes: 0 success, 1 usage error, 2 input/output failure,
//! 3 render failure.

use std::error::Error;
use std::{env, path::PathBuf, process};

use html2pdf_forge::error::{ConvertError, EXIT_OK};
use html2pdf_forge::fonts::FontRegistration;
use html2pdf_forge::pipeline::{convert_file, write_output, ConvertOptions};
use html2pdf_forge::PageOrientation;

enum Command {
    Help,
    Convert {
        input: PathBuf,
        output: PathBuf,
        layout_json: Option<PathBuf>,
        opts: Box<ConvertOptions>,
    },
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("html2pdf");

    let code = match parse_args(args.get(1..).unwrap_or(&[])).and_then(run) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            report(prog, &e);
            e.exit_code()
        }
    };
    process::exit(code);
}

fn run(command: Command) -> Result<(), ConvertError> {
    let (input, output, layout_json, opts) = match command {
        Command::Help => {
            print_usage("html2pdf");
            return Ok(());
        }
        Command::Convert {
            input,
            output,
            layout_json,
            opts,
        } => (input, output, layout_json, opts),
    };

    let summary = convert_file(&input, &output, &opts)?;
    if let Some(path) = layout_json {
        write_output(&path, summary.layout.to_json().as_bytes())?;
    }
    eprintln!(
        "Wrote '{}' ({} bytes, {} page{})",
        output.display(),
        summary.bytes,
        summary.pages,
        if summary.pages == 1 { "" } else { "s" }
    );
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Command, ConvertError> {
    let mut opts = ConvertOptions::default();
    let mut layout_json = None;
    let mut positional: Vec<&str> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--css" => opts.extra_css = Some(value(arg, &mut iter)?),
            "--autolink" => opts.autolink = true,
            "--empty-paragraphs" => opts.empty_paragraphs = parsed(arg, &mut iter)?,
            "--font" => opts.fonts.push(parsed::<FontRegistration>(arg, &mut iter)?),
            "--page-size" => opts.print_style.page_size = parsed(arg, &mut iter)?,
            "--landscape" | "-l" => opts.print_style.orientation = PageOrientation::Landscape,
            "--margins" => opts.print_style.margins = parsed(arg, &mut iter)?,
            "--first-margin-top" => {
                opts.print_style.first_page_margin_top = Some(points(arg, &mut iter)?)
            }
            "--font-family" => opts.print_style.font_family = value(arg, &mut iter)?,
            "--font-size" => {
                let size = points(arg, &mut iter)?;
                if size <= 0.0 {
                    return Err(ConvertError::Usage(format!("{arg} must be positive")));
                }
                opts.print_style.font_size_pt = size;
            }
            "--container" => opts.container_id = Some(value(arg, &mut iter)?),
            "--title" | "-t" => opts.title = Some(value(arg, &mut iter)?),
            "--precise" => opts.fast_mode = false,
            "--layout-json" => layout_json = Some(PathBuf::from(value(arg, &mut iter)?)),
            other if other.starts_with('-') && other != "-" => {
                return Err(ConvertError::Usage(format!("unknown flag: {other}")));
            }
            path => positional.push(path),
        }
    }

    let (input, output, base_url) = match positional[..] {
        [input, output] => (input, output, None),
        [input, output, base] => (input, output, Some(base)),
        _ => {
            return Err(ConvertError::Usage(format!(
                "expected <input.html> <output.pdf> [baseUrl|-], got {} argument(s)",
                positional.len()
            )))
        }
    };
    opts.base_url = base_url.filter(|b| *b != "-").map(str::to_string);

    Ok(Command::Convert {
        input: PathBuf::from(input),
        output: PathBuf::from(output),
        layout_json,
        opts: Box::new(opts),
    })
}

fn value<'a>(flag: &str, iter: &mut impl Iterator<Item = &'a String>) -> Result<String, ConvertError> {
    iter.next()
        .cloned()
        .ok_or_else(|| ConvertError::Usage(format!("{flag} needs a value")))
}

fn parsed<'a, T>(flag: &str, iter: &mut impl Iterator<Item = &'a String>) -> Result<T, ConvertError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = value(flag, iter)?;
    raw.parse()
        .map_err(|e| ConvertError::Usage(format!("{flag} '{raw}': {e}")))
}

/// A point value; `NaN` and infinities are rejected.
fn points<'a>(flag: &str, iter: &mut impl Iterator<Item = &'a String>) -> Result<f32, ConvertError> {
    let value: f32 = parsed(flag, iter)?;
    if !value.is_finite() {
        return Err(ConvertError::Usage(format!("{flag} '{value}' is not a finite number")));
    }
    Ok(value)
}

fn report(prog: &str, err: &ConvertError) {
    eprintln!("Error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
    if matches!(err, ConvertError::Usage(_)) {
        eprintln!();
        print_usage(prog);
    }
}

fn print_usage(prog: &str) {
    eprintln!("html2pdf – editor HTML to PDF converter");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} [flags] <input.html> <output.pdf> [baseUrl|-]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input.html>   HTML fragment or document to convert (UTF-8)");
    eprintln!("  <output.pdf>   Output path, written only when rendering succeeds");
    eprintln!("  [baseUrl|-]    file: URL or directory for relative images (default: working directory)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --css <text>                 Extra CSS appended after the print template");
    eprintln!("  --autolink                   Link bare URLs and e-mail addresses");
    eprintln!("  --empty-paragraphs <policy>  remove | nbsp | br (default: remove)");
    eprintln!("  --font <path>=<Family>       Register a font; suffix :bold, :italic or :bold-italic");
    eprintln!("  --page-size <size>           A4 | A5 | Letter | Legal | <W>x<H>mm (default: A4)");
    eprintln!("  --landscape, -l              Landscape orientation");
    eprintln!("  --margins \"T R B L\"          Page margins in pt (default: 130 55 60 55)");
    eprintln!("  --first-margin-top <pt>      Top margin of the first page");
    eprintln!("  --font-family <css>          Body font-family (default: Arial, sans-serif)");
    eprintln!("  --font-size <pt>             Body font size (default: 10)");
    eprintln!("  --container <id>             Wrap the content in <div id=\"…\">");
    eprintln!("  --title, -t <text>           Document title");
    eprintln!("  --precise                    Shape registered fonts for exact line widths");
    eprintln!("  --layout-json <path>         Also write the paginated layout as JSON");
    eprintln!("  --help                       Print this message");
}
