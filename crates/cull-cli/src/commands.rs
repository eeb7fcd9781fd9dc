use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;

use cull_archive::{
    classify_libraries, list_classes, read_class_entries, AttributeInitHook, ContainerRewriter,
    InstrumentTransform, LibraryVerdict, UnusedAlertTransform,
};
use cull_store::UsageStore;

use crate::cli::{Cli, Command};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let store_path = cli.store;
    match cli.command {
        Command::UsedClasses => {
            print_sorted(&load_store(&store_path)?.used_classes());
            Ok(())
        }
        Command::LoadedClasses => {
            print_sorted(&load_store(&store_path)?.loaded_classes());
            Ok(())
        }
        Command::UnusedClasses(args) => {
            let store = load_store(&store_path)?;
            let unused = match &args.jar {
                Some(jar) => {
                    let used = store.used_classes();
                    list_classes(jar)
                        .with_context(|| format!("reading {}", jar.display()))?
                        .into_iter()
                        .filter(|class| !used.contains(class))
                        .collect()
                }
                None => store.unused_classes(),
            };
            print_sorted(&unused);
            Ok(())
        }
        Command::AllClasses(args) => {
            let classes =
                list_classes(&args.jar).with_context(|| format!("reading {}", args.jar.display()))?;
            print_sorted(&classes);
            Ok(())
        }
        Command::UsedLibraries(args) => {
            let verdict = library_verdict(&store_path, &args.jar, false)?;
            print_sorted(&verdict.used);
            Ok(())
        }
        Command::UnusedLibraries(args) => {
            let verdict = library_verdict(&store_path, &args.jar, false)?;
            print_sorted(&verdict.unused);
            Ok(())
        }
        Command::LoadedLibraries(args) => {
            let verdict = library_verdict(&store_path, &args.jar, true)?;
            print_sorted(&verdict.used);
            Ok(())
        }
        Command::NotLoadedLibraries(args) => {
            let verdict = library_verdict(&store_path, &args.jar, true)?;
            print_sorted(&verdict.unused);
            Ok(())
        }
        Command::AlertUnused(args) => {
            let store = load_store(&store_path)?;
            let transform = UnusedAlertTransform::new(
                &AttributeInitHook,
                |class| store.is_class_used(class) && !store.is_class_marked_for_deletion(class),
                |class| store.deletion_message(class),
                args.exit,
            );
            let sink = create_output(&args.output)?;
            ContainerRewriter::new()
                .with_transform(&transform)
                .rewrite(&args.jar, sink)
                .with_context(|| format!("rewriting {}", args.jar.display()))?;
            println!("{} Wrote {}", "✓".green().bold(), args.output.display());
            Ok(())
        }
        Command::Instrument(args) => {
            let store = UsageStore::new();
            let transform = InstrumentTransform::new(&AttributeInitHook, &store, &store_path);
            let mut rewriter = ContainerRewriter::new().with_transform(&transform);
            if let Some(runtime) = &args.runtime {
                let extra = read_class_entries(runtime)
                    .with_context(|| format!("reading runtime classes from {}", runtime.display()))?;
                rewriter = rewriter.with_extra_entries(extra);
            }
            let sink = create_output(&args.output)?;
            rewriter
                .rewrite(&args.jar, sink)
                .with_context(|| format!("rewriting {}", args.jar.display()))?;

            // Seed the store file with the loaded-class universe the
            // instrumented archive will report against.
            store.set_output(store_path.clone());
            store
                .flush()
                .with_context(|| format!("writing usage store {}", store_path.display()))?;
            println!("{} Wrote {}", "✓".green().bold(), args.output.display());
            Ok(())
        }
        Command::Reduce(args) => {
            let store = load_store(&store_path)?;
            let verdict = classify_libraries(&args.jar, |class| store.is_class_used(class))
                .with_context(|| format!("reading {}", args.jar.display()))?;

            let mut rewriter = ContainerRewriter::new()
                .with_library_filter(|library| verdict.used.contains(library));
            if !args.only_libraries {
                rewriter = rewriter.with_class_filter(|class| {
                    store.is_class_loaded(class) && !store.is_class_marked_for_deletion(class)
                });
            }
            let sink = create_output(&args.output)?;
            rewriter
                .rewrite(&args.jar, sink)
                .with_context(|| format!("rewriting {}", args.jar.display()))?;
            println!("{} Wrote {}", "✓".green().bold(), args.output.display());
            Ok(())
        }
    }
}

fn load_store(path: &Path) -> anyhow::Result<UsageStore> {
    UsageStore::load(path, false)
        .with_context(|| format!("loading usage store {}", path.display()))
}

fn library_verdict(
    store_path: &Path,
    jar: &Path,
    count_loaded_as_used: bool,
) -> anyhow::Result<LibraryVerdict> {
    let store = load_store(store_path)?;
    classify_libraries(jar, |class| {
        if count_loaded_as_used {
            store.is_class_loaded(class)
        } else {
            store.is_class_used(class)
        }
    })
    .with_context(|| format!("reading {}", jar.display()))
}

fn create_output(path: &Path) -> anyhow::Result<File> {
    File::create(path).with_context(|| format!("creating {}", path.display()))
}

fn print_sorted(names: &BTreeSet<String>) {
    for name in names {
        println!("{name}");
    }
}
