use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};

use bao::{
    lexer::{Token, TokenKind, Tokenizer},
    CompileError, InterpretError, Vm,
};
use clap::{error::ErrorKind, Parser};
use codesnake::{Block, CodeWidth, Label, LineIndex};
use rustyline::error::ReadlineError;
use yansi::Paint;

/// Compile and run bao programs, or start a REPL when no path is given.
#[derive(Parser, Debug)]
#[command(name = "bao", version)]
struct Cli {
    /// program to run
    path: Option<PathBuf>,
    /// show the tokens of each input before compiling it
    #[arg(long)]
    tokens: bool,
    /// show the compiled bytecode before running it
    #[arg(long)]
    disassemble: bool,
    /// underline the offending source in compile errors
    #[arg(long)]
    snippets: bool,
    /// log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            log::Level::Error => "error".red().bold(),
            log::Level::Warn => "warn".yellow().bold(),
            log::Level::Info => "info".green(),
            log::Level::Debug => "debug".blue(),
            log::Level::Trace => "trace".dim(),
        };
        eprintln!("{level}: {}", record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn make_block<'a>(
    idx: &'a LineIndex,
    labels: impl IntoIterator<Item = Token<'a>>,
) -> Option<Block<&'a str, String>> {
    Block::new(
        idx,
        labels.into_iter().map(|tok| {
            let text = format!("{:?}", tok.kind);
            let kind = tok.kind;
            Label::new(tok.span)
                .with_text(if kind == TokenKind::Error {
                    format!("{text} {}", tok.lexeme).red().to_string()
                } else {
                    text.green().to_string()
                })
                .with_style(move |s| match kind {
                    TokenKind::Symbol => s.blue().to_string(),
                    TokenKind::Number => s.yellow().to_string(),
                    TokenKind::String => s.cyan().to_string(),
                    TokenKind::Error => s.red().to_string(),
                    _ => s,
                })
        }),
    )
}

fn print_block(block: Block<&str, String>, name: &str) {
    let block = block.map_code(|c| CodeWidth::new(c, c.len()));
    eprintln!("{}[{name}]", block.prologue());
    eprint!("{block}");
    eprintln!("{}", block.epilogue());
}

/// Dumps the tokens of `source`, one block per source line.
fn dump_tokens(source: &str, name: &str) {
    let idx = LineIndex::new(source);
    let mut tokens = Tokenizer::new(source);

    let mut blocks = vec![];
    let mut line_labels: Vec<Token> = vec![];
    loop {
        let token = tokens.next_token();
        if token.kind == TokenKind::Eof {
            break;
        }
        if line_labels.last().is_some_and(|last| last.line != token.line) {
            blocks.push(make_block(&idx, line_labels.drain(..)));
        }
        line_labels.push(token);
    }
    if !line_labels.is_empty() {
        blocks.push(make_block(&idx, line_labels.drain(..)));
    }

    for block in blocks.into_iter().flatten() {
        print_block(block, name);
    }
}

fn compile_snippet(source: &str, name: &str, err: &CompileError) {
    // nothing to underline at the end of input
    if err.span.is_empty() {
        return;
    }
    let idx = LineIndex::new(source);
    let label = Label::new(err.span.clone())
        .with_text(err.kind.to_string().red().to_string())
        .with_style(|s| s.red().to_string());
    if let Some(block) = Block::new(&idx, [label]) {
        print_block(block, name);
    }
}

fn report(source: &str, name: &str, err: &InterpretError, snippets: bool) {
    eprintln!("{err}");
    if let (true, InterpretError::Compile(compile)) = (snippets, err) {
        compile_snippet(source, name, compile);
    }
}

fn execute<W: Write>(
    vm: &mut Vm<W>,
    source: &str,
    name: &str,
    cli: &Cli,
) -> Result<(), InterpretError> {
    if cli.tokens {
        dump_tokens(source, name);
    }
    let chunk = vm.compile(source)?;
    if cli.disassemble {
        eprint!("{}", chunk.disassemble(name, vm.heap()));
    }
    vm.run(&chunk)?;
    Ok(())
}

fn repl(cli: &Cli) -> anyhow::Result<()> {
    let mut readline = rustyline::DefaultEditor::new()?;
    let mut vm = Vm::new();

    loop {
        match readline.readline("> ") {
            Ok(line) => {
                // blank lines are programs too, and report a missing expression
                readline.add_history_entry(line.as_str())?;
                if let Err(err) = execute(&mut vm, &line, "repl", cli) {
                    report(&line, "repl", &err, cli.snippets);
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

fn run_file(cli: &Cli, path: &Path) -> i32 {
    let source = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            log::debug!("reading {}: {err}", path.display());
            eprintln!("Could not open file \"{}\".", path.display());
            return 74;
        }
    };

    let name = path.display().to_string();
    let mut vm = Vm::new();
    let result = execute(&mut vm, &source, &name, cli);
    _ = io::stdout().flush();
    match result {
        Ok(()) => 0,
        Err(err) => {
            report(&source, &name, &err, cli.snippets);
            err.exit_code()
        }
    }
}

fn main() -> anyhow::Result<()> {
    yansi::whenever(yansi::Condition::TTY_AND_COLOR);

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(_) => {
            eprintln!("Usage: bao [path]");
            process::exit(64);
        }
    };
    init_logging(cli.verbose);

    match &cli.path {
        Some(path) => process::exit(run_file(&cli, path)),
        None => repl(&cli),
    }
}
