use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cull",
    about = "Detect and remove dead classes and libraries in packaged archives",
    version,
)]
pub struct Cli {
    /// The persisted usage store file.
    #[arg(value_name = "STORE")]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List all used classes
    UsedClasses,
    /// List all loaded classes
    LoadedClasses,
    /// List unused classes: loaded but never used, or, with a JAR, present
    /// in the JAR but not recorded as used
    UnusedClasses(UnusedClassesArgs),
    /// List every class in the JAR, at any nesting depth
    AllClasses(JarArgs),
    /// List libraries containing a used class
    UsedLibraries(JarArgs),
    /// List libraries containing no used class
    UnusedLibraries(JarArgs),
    /// List libraries containing a loaded class
    LoadedLibraries(JarArgs),
    /// List libraries present but never loaded
    NotLoadedLibraries(JarArgs),
    /// Inject an alert (optionally fatal) into every class not recorded as used
    AlertUnused(AlertUnusedArgs),
    /// Instrument all classes to record which are loaded and used
    Instrument(InstrumentArgs),
    /// Remove unused classes and libraries from the JAR
    Reduce(ReduceArgs),
}

#[derive(Args)]
pub struct JarArgs {
    #[arg(value_name = "JAR")]
    pub jar: PathBuf,
}

#[derive(Args)]
pub struct UnusedClassesArgs {
    #[arg(value_name = "JAR")]
    pub jar: Option<PathBuf>,
}

#[derive(Args)]
pub struct AlertUnusedArgs {
    #[arg(value_name = "JAR")]
    pub jar: PathBuf,
    #[arg(value_name = "OUTPUT_JAR")]
    pub output: PathBuf,
    /// Make the injected alert fatal (System.exit(1))
    #[arg(long)]
    pub exit: bool,
}

#[derive(Args)]
pub struct InstrumentArgs {
    #[arg(value_name = "JAR")]
    pub jar: PathBuf,
    #[arg(value_name = "OUTPUT_JAR")]
    pub output: PathBuf,
    /// Archive whose classes are appended as runtime support
    #[arg(long, value_name = "JAR")]
    pub runtime: Option<PathBuf>,
}

#[derive(Args)]
pub struct ReduceArgs {
    #[arg(value_name = "JAR")]
    pub jar: PathBuf,
    #[arg(value_name = "OUTPUT_JAR")]
    pub output: PathBuf,
    /// Only remove libraries, keep all classes
    #[arg(long)]
    pub only_libraries: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_used_classes() {
        let cli = Cli::try_parse_from(["cull", "usage.log", "used-classes"]).unwrap();
        assert_eq!(cli.store, PathBuf::from("usage.log"));
        assert!(matches!(cli.command, Command::UsedClasses));
    }

    #[test]
    fn parse_unused_classes_without_jar() {
        let cli = Cli::try_parse_from(["cull", "usage.log", "unused-classes"]).unwrap();
        if let Command::UnusedClasses(args) = cli.command {
            assert!(args.jar.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_unused_classes_with_jar() {
        let cli = Cli::try_parse_from(["cull", "usage.log", "unused-classes", "app.jar"]).unwrap();
        if let Command::UnusedClasses(args) = cli.command {
            assert_eq!(args.jar, Some(PathBuf::from("app.jar")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_unused_libraries() {
        let cli = Cli::try_parse_from(["cull", "usage.log", "unused-libraries", "app.jar"]).unwrap();
        if let Command::UnusedLibraries(args) = cli.command {
            assert_eq!(args.jar, PathBuf::from("app.jar"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_alert_unused_with_exit() {
        let cli = Cli::try_parse_from([
            "cull",
            "usage.log",
            "alert-unused",
            "app.jar",
            "out.jar",
            "--exit",
        ])
        .unwrap();
        if let Command::AlertUnused(args) = cli.command {
            assert!(args.exit);
            assert_eq!(args.output, PathBuf::from("out.jar"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_instrument_with_runtime() {
        let cli = Cli::try_parse_from([
            "cull",
            "usage.log",
            "instrument",
            "app.jar",
            "out.jar",
            "--runtime",
            "runtime.jar",
        ])
        .unwrap();
        if let Command::Instrument(args) = cli.command {
            assert_eq!(args.runtime, Some(PathBuf::from("runtime.jar")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_reduce_only_libraries() {
        let cli = Cli::try_parse_from([
            "cull",
            "usage.log",
            "reduce",
            "app.jar",
            "out.jar",
            "--only-libraries",
        ])
        .unwrap();
        if let Command::Reduce(args) = cli.command {
            assert!(args.only_libraries);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["cull", "usage.log"]).is_err());
    }
}
