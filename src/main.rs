use std::env;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};

use appx_packer::infra::inputs::{add_input_argument, parse_mapping_file, FileMapping};
use appx_packer::{pack_appx, CompressionLevel, PackagingConfig, PivPin, SigningCredentials};

const BUNDLE_MANIFEST_NAME: &str = "AppxMetadata/AppxBundleManifest.xml";

fn cli() -> Command {
    let mut command = Command::new("appx-packer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Creates an optionally-signed Microsoft APPX or APPXBUNDLE package")
        .after_help(
            "An input is either a directory (all files below it are included), \
             a plain file (included at the package root), an ARCHIVE=LOCAL pair, \
             or a mapping file given with -f.\n\n\
             A mapping file has the form:\n\n  \
             [Files]\n  \"/path/to/local/file.exe\" \"appx_file.exe\"\n\n\
             Signing through a smartcard:\n  \
             -m /usr/lib/x86_64-linux-gnu/opensc-pkcs11.so -s 1 -k 0 -p passphrase\n\
             If -p is omitted, the APPX_PIV_PIN environment variable is used.",
        )
        .arg(
            Arg::new("output")
                .short('o')
                .value_name("FILE")
                .help("Write the APPX (or APPXBUNDLE with -b) to this file")
                .required(true),
        )
        .arg(
            Arg::new("certificate")
                .short('c')
                .value_name("PFX-FILE")
                .help("Sign the package with this PKCS#12 private key file")
                .conflicts_with("module"),
        )
        .arg(
            Arg::new("module")
                .short('m')
                .value_name("MODULE-FILE")
                .help("A PKCS#11 module to use for smartcard signing")
                .requires("slot")
                .requires("key"),
        )
        .arg(
            Arg::new("slot")
                .short('s')
                .value_name("SLOT")
                .help("Smartcard slot id holding the signing key"),
        )
        .arg(
            Arg::new("key")
                .short('k')
                .value_name("KEY-ID")
                .help("Smartcard key id"),
        )
        .arg(
            Arg::new("pin")
                .short('p')
                .value_name("PIN")
                .help("PIV PIN unlocking the smartcard key"),
        )
        .arg(
            Arg::new("bundle")
                .short('b')
                .action(ArgAction::SetTrue)
                .help("Produce an APPXBUNDLE instead of an APPX"),
        )
        .arg(
            Arg::new("mapping")
                .short('f')
                .value_name("MAP-FILE")
                .action(ArgAction::Append)
                .help("Read inputs from a mapping file ('-' for standard input)"),
        )
        .arg(
            Arg::new("inputs")
                .value_name("INPUT")
                .action(ArgAction::Append)
                .help("ARCHIVE=LOCAL pair, or a file or directory to include"),
        );
    // -0 .. -9 select the ZIP compression level; the last one given wins.
    for digit in 0..=9u32 {
        let help = match digit {
            0 => "No ZIP compression (store files)".to_string(),
            9 => "Best ZIP compression".to_string(),
            _ => format!("ZIP compression level {digit}"),
        };
        command = command.arg(
            Arg::new(level_arg_id(digit))
                .short(char::from_digit(digit, 10).expect("digit"))
                .action(ArgAction::SetTrue)
                .help(help),
        );
    }
    command
}

fn level_arg_id(digit: u32) -> &'static str {
    match digit {
        0 => "level0",
        1 => "level1",
        2 => "level2",
        3 => "level3",
        4 => "level4",
        5 => "level5",
        6 => "level6",
        7 => "level7",
        8 => "level8",
        9 => "level9",
        _ => unreachable!("compression level digit out of range"),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let matches = cli().get_matches();

    let output_path = PathBuf::from(
        matches
            .get_one::<String>("output")
            .expect("output is required"),
    );

    // Last compression flag on the command line wins, as with getopt.
    let mut compression_level = CompressionLevel::STORE;
    let mut last_index = 0usize;
    for digit in 0..=9u32 {
        let id = level_arg_id(digit);
        if matches.get_flag(&id) {
            if let Some(index) = matches.indices_of(&id).and_then(Iterator::max) {
                if index >= last_index {
                    last_index = index;
                    compression_level =
                        CompressionLevel::new(digit).context("invalid compression level")?;
                }
            }
        }
    }

    let is_bundle = matches.get_flag("bundle");

    let credentials = build_credentials(&matches)?;

    let mut file_names = FileMapping::new();
    if let Some(mapping_files) = matches.get_many::<String>("mapping") {
        for mapping_file in mapping_files {
            if mapping_file == "-" {
                let stdin = std::io::stdin();
                parse_mapping_file(stdin.lock(), "(standard input)", &mut file_names)?;
            } else {
                let file = std::fs::File::open(mapping_file)
                    .with_context(|| format!("cannot open mapping file {mapping_file}"))?;
                parse_mapping_file(BufReader::new(file), mapping_file, &mut file_names)?;
            }
        }
    }
    if let Some(inputs) = matches.get_many::<String>("inputs") {
        for input in inputs {
            add_input_argument(input, &mut file_names)?;
        }
    }
    if file_names.is_empty() {
        bail!("missing inputs");
    }
    if is_bundle && !file_names.contains_key(BUNDLE_MANIFEST_NAME) {
        bail!("bundle mode requires an {BUNDLE_MANIFEST_NAME} input");
    }

    let config = PackagingConfig {
        compression_level,
        bundle: is_bundle,
        credentials,
    };
    pack_appx(&output_path, &file_names, &config)
        .with_context(|| format!("failed to package {}", output_path.display()))?;
    Ok(())
}

fn build_credentials(matches: &clap::ArgMatches) -> Result<Option<SigningCredentials>> {
    if let Some(certificate) = matches.get_one::<String>("certificate") {
        return Ok(Some(SigningCredentials::Pkcs12File {
            path: PathBuf::from(certificate),
        }));
    }
    let Some(module) = matches.get_one::<String>("module") else {
        return Ok(None);
    };

    let slot_id: u64 = matches
        .get_one::<String>("slot")
        .context("missing -s parameter for smartcard signing")?
        .parse()
        .context("invalid value provided for -s parameter")?;
    let key_id: u8 = matches
        .get_one::<String>("key")
        .context("missing -k parameter for smartcard signing")?
        .parse()
        .context("invalid value provided for -k parameter")?;
    let pin = match matches.get_one::<String>("pin") {
        Some(pin) => pin.clone(),
        None => env::var("APPX_PIV_PIN").context("no PIV passphrase provided")?,
    };

    Ok(Some(SigningCredentials::Pkcs11Token {
        module: PathBuf::from(module),
        slot_id,
        key_id,
        pin: PivPin::new(pin)?,
    }))
}
