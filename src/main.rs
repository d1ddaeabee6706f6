use std::{io::IsTerminal, process::ExitCode};

use clap::{ArgAction, CommandFactory, Parser as ClapParser, ValueEnum, error::ErrorKind};
use colored::Colorize;
use gsmc::{
    CompileOptions, analyze, compile,
    error::CompileError,
    frontend::{
        SourceFile, SourceFileOrigin,
        lexer::{Keyword, Lexer},
    },
    middle::ir::{
        self,
        interpret::{InterpretOptions, interpret},
        pretty_print::to_plain_string,
    },
};
use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

/// Compiles a GSM expression program to IR
#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Full program text (not a path)
    program: String,

    /// Stage output to print
    #[arg(long, value_enum, default_value_t = Emit::Ir)]
    emit: Emit,

    /// Keep statements that never reach the sentinel variable
    #[arg(long)]
    no_optimize: bool,

    /// Output variable that seeds dead code elimination
    #[arg(long, default_value = "result")]
    sentinel: String,

    /// Execute the generated module and print every written value
    #[arg(long)]
    run: bool,

    /// Instruction budget for `--run`
    #[arg(long, env = "GSMC_MAX_STEPS", default_value_t = InterpretOptions::default().max_steps)]
    max_steps: usize,

    /// More logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    Ir,
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose);

    if !is_identifier(&args.sentinel) {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Sentinel '{}' is not a valid identifier!", args.sentinel),
            )
            .exit()
    }

    if args.max_steps == 0 {
        Args::command()
            .error(ErrorKind::InvalidValue, "Step budget must be at least 1!")
            .exit()
    }

    let source = SourceFile::new(args.program.as_str(), SourceFileOrigin::CommandLine);
    let options = CompileOptions {
        optimize: !args.no_optimize,
        sentinel: args.sentinel.clone(),
        ..CompileOptions::default()
    };

    debug!(?options, emit = ?args.emit, "starting compilation");

    let module = match args.emit {
        Emit::Tokens => {
            for token in Lexer::new(&source) {
                println!("{:?} {:?}", token.kind, source.value_of_span(token.span));
            }

            None
        }
        Emit::Ast => match analyze(&source, &options) {
            Ok(program) => {
                print!("{program}");
                None
            }
            Err(error) => return report_compile_error(&source, &error),
        },
        Emit::Ir => match compile(&source, &options) {
            Ok(module) => {
                if std::io::stdout().is_terminal() {
                    print!("{module}");
                } else {
                    print!("{}", to_plain_string(&module));
                }

                Some(module)
            }
            Err(error) => return report_compile_error(&source, &error),
        },
    };

    if !args.run {
        return ExitCode::SUCCESS;
    }

    let module = match module {
        Some(module) => module,
        None => match compile(&source, &options) {
            Ok(module) => module,
            Err(error) => return report_compile_error(&source, &error),
        },
    };

    run_module(&module, args.max_steps)
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("GSMC_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(filter)
        .init();
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.parse::<Keyword>().is_err()
}

fn for_stderr(text: String) -> String {
    if std::io::stderr().is_terminal() {
        text
    } else {
        strip_ansi_escapes::strip_str(text)
    }
}

fn report_compile_error(source: &SourceFile, error: &CompileError) -> ExitCode {
    debug!(%error, "compilation failed");

    let mut message = format!("{}\n", error.summary().bright_red().bold());

    for diagnostic in error.diagnostics() {
        message.push_str(&diagnostic.render(source));
        message.push('\n');
    }

    eprint!("{}", for_stderr(message));

    ExitCode::FAILURE
}

fn run_module(module: &ir::Module, max_steps: usize) -> ExitCode {
    match interpret(module, &InterpretOptions { max_steps }) {
        Ok(execution) => {
            for value in execution.writes {
                println!("{value}");
            }

            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!(
                "{}",
                for_stderr(format!("{} {error}", "Runtime trap:".bright_red().bold()))
            );

            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn sentinel_names_must_be_identifiers() {
        assert!(is_identifier("result"));
        assert!(is_identifier("_out2"));
        assert!(!is_identifier("2out"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("loopc"));
    }
}
