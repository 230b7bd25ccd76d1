// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn topdir_arg() -> Arg {
    Arg::new("topdir")
        .required(true)
        .help("Archive root (the directory holding dists/ and pool/)")
}

fn pool_args(cmd: Command) -> Command {
    cmd.arg(topdir_arg())
        .arg(
            Arg::new("index")
                .short('i')
                .long("index")
                .action(ArgAction::SetTrue)
                .help("Also prune index records whose files are missing"),
        )
        .arg(
            Arg::new("exclude")
                .short('e')
                .long("exclude")
                .value_name("REGEX")
                .help("Never remove or prune pool paths matching this regex"),
        )
        .arg(
            Arg::new("md5")
                .long("md5")
                .action(ArgAction::SetTrue)
                .help("Verify md5 sums of indexed files"),
        )
        .arg(
            Arg::new("size")
                .long("size")
                .action(ArgAction::SetTrue)
                .help("Verify sizes of indexed files"),
        )
}

fn build_cli() -> Command {
    Command::new("archive-man")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Archive-Man Contributors")
        .about("Metadata consistency tools for Debian-style archives")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Configuration file"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at info instead of the configured level"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print reports as JSON"),
        )
        .subcommand(
            Command::new("diff")
                .about("Compare the newest packages of two suites")
                .arg(Arg::new("source1").required(true).help("First suite (directory, Release file or URL)"))
                .arg(Arg::new("source2").required(true).help("Second suite"))
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .value_parser(["source", "binary"])
                        .default_value("source")
                        .help("Compare source or binary packages"),
                )
                .arg(
                    Arg::new("files")
                        .short('f')
                        .long("files")
                        .action(ArgAction::SetTrue)
                        .help("Print pool paths instead of versions"),
                )
                .arg(
                    Arg::new("compare")
                        .short('c')
                        .long("compare")
                        .action(ArgAction::SetTrue)
                        .help("Report every common package with <, = or >"),
                ),
        )
        .subcommand(
            Command::new("diff-md5")
                .about("Compare indexed md5 sums of pool files shared by two archives")
                .arg(Arg::new("archive1").required(true))
                .arg(Arg::new("archive2").required(true)),
        )
        .subcommand(
            Command::new("merge")
                .about("Merge several suites into a new one")
                .arg(
                    Arg::new("dists")
                        .short('d')
                        .long("dists")
                        .required(true)
                        .help("Directory holding the suites"),
                )
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .required(true)
                        .help("Name of the suite to create"),
                )
                .arg(
                    Arg::new("sources")
                        .required(true)
                        .num_args(1..)
                        .help("Suites to merge, in priority order"),
                )
                .arg(
                    Arg::new("policy")
                        .short('p')
                        .long("policy")
                        .value_parser(["first", "last", "version"])
                        .default_value("version")
                        .help("How to pick among suites"),
                )
                .arg(
                    Arg::new("binary")
                        .short('b')
                        .long("binary")
                        .action(ArgAction::SetTrue)
                        .help("Key packages by binary name and architecture"),
                )
                .arg(
                    Arg::new("contents")
                        .short('c')
                        .long("contents")
                        .action(ArgAction::SetTrue)
                        .help("Carry Contents files forward"),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite an existing target suite"),
                ),
        )
        .subcommand(pool_args(
            Command::new("check").about("Report pool files and index entries that disagree"),
        ))
        .subcommand(
            pool_args(Command::new("strip").about("Remove pool files no index references"))
                .arg(
                    Arg::new("backup")
                        .short('b')
                        .long("backup")
                        .value_name("DIR")
                        .help("Move removed files under this directory"),
                )
                .arg(
                    Arg::new("dry_run")
                        .short('n')
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Report only"),
                ),
        )
        .subcommand(
            Command::new("checkdep")
                .about("Report dependency groups nothing satisfies")
                .arg(Arg::new("suite").required(true).help("Suite to check"))
                .arg(
                    Arg::new("extra")
                        .short('e')
                        .long("extra")
                        .action(ArgAction::Append)
                        .help("Additional suites that may satisfy dependencies"),
                )
                .arg(
                    Arg::new("ignore_noexist")
                        .long("ignore-noexist")
                        .action(ArgAction::SetTrue)
                        .help("Skip groups none of whose packages exist anywhere"),
                )
                .arg(
                    Arg::new("ge_only")
                        .long("ge-only")
                        .action(ArgAction::SetTrue)
                        .help("Only report groups containing a >= relation"),
                ),
        )
        .subcommand(
            Command::new("rename")
                .about("Rewrite pool paths recorded in Packages indices")
                .arg(topdir_arg())
                .arg(Arg::new("old").help("Old pool path"))
                .arg(Arg::new("new").help("New pool path"))
                .arg(
                    Arg::new("list")
                        .short('l')
                        .long("list")
                        .value_name("FILE")
                        .help("File of old,new lines"),
                )
                .arg(
                    Arg::new("move")
                        .short('f')
                        .long("move")
                        .action(ArgAction::SetTrue)
                        .help("Also move the pool files"),
                ),
        )
        .subcommand(
            Command::new("dedup")
                .about("Rewrite a Packages or Sources file keeping one record per name")
                .arg(Arg::new("index").required(true).help("Packages or Sources file")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("archive-man.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
