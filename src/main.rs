use std::error::Error;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{Level, info};

use textio::{
    Encoding, EncodingHeuristic, MalformedPolicy, StreamReader, StreamWriter, TextStatistics,
};

#[derive(Debug, Parser)]
#[command(bin_name = "textio")]
#[command(version)]
#[command(about = "Detect the encoding of a text file, print it normalized or convert it")]
struct CliArgs {
    #[arg(help = "Text file to read")]
    input: PathBuf,

    #[arg(
        long,
        short = 'e',
        help = "Encoding to use when the file has no BOM (e.g. utf-8, utf-16le, shift_jis, ansi)"
    )]
    encoding: Option<String>,

    #[arg(long, help = "Guess the encoding of BOM-less files from byte statistics")]
    detect: bool,

    #[arg(long, help = "Fail on malformed input instead of substituting U+FFFD")]
    strict: bool,

    #[arg(long, help = "Print numbered lines instead of the raw text")]
    lines: bool,

    #[arg(long, short = 'o', help = "Write the text to this file instead of stdout")]
    output: Option<PathBuf>,

    #[arg(
        long,
        short = 't',
        default_value = "utf-8",
        help = "Encoding of the output file"
    )]
    to: String,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let hint = args.encoding.as_deref().map(Encoding::for_label).transpose()?;
    let policy = if args.strict {
        MalformedPolicy::Error
    } else {
        MalformedPolicy::Replace
    };
    let statistics = TextStatistics::default();
    let heuristic = if args.detect {
        Some(&statistics as &dyn EncodingHeuristic)
    } else {
        None
    };

    let file = std::fs::File::open(&args.input)?;
    let mut reader = StreamReader::builder()
        .stream(file)
        .maybe_encoding(hint)
        .maybe_heuristic(heuristic)
        .malformed(policy)
        .build()?;
    info!("{}: {}", args.input.display(), reader.encoding());

    if let Some(output) = &args.output {
        let target = Encoding::for_label(&args.to)?;
        let text = reader.read_to_end()?;
        let mut writer = StreamWriter::create(output, target)?;
        writer.write(&text)?;
        writer.flush()?;
        info!("Wrote {} as {}", output.display(), target);
        return Ok(());
    }

    // 封装一个writer并缓冲其输出，避免频繁系统调用
    // 务必在BufWrite drop前调用flush
    // 虽然BufWrite drop时会尝试刷新缓冲区，但会忽略错误
    let mut stdout = BufWriter::new(io::stdout().lock());
    if args.lines {
        for (number, line) in reader.lines().enumerate() {
            writeln!(stdout, "{:>6}: {}", number + 1, line?)?;
        }
    } else {
        write!(stdout, "{}", reader.read_to_end()?)?;
    }
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn parses_conversion_flags() {
        let args =
            CliArgs::try_parse_from(["textio", "in.txt", "--detect", "-o", "out.txt", "-t", "utf-16le", "-vv"])
                .unwrap();
        assert!(args.detect);
        assert_eq!(args.output, Some(PathBuf::from("out.txt")));
        assert_eq!(args.to, "utf-16le");
        assert_eq!(args.verbose, 2);
    }
}
