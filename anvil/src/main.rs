/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use anvil::{run, Config};

const USAGE: &str = "usage: anvil [options] [targets...]

options:
  -C DIR        change to DIR before doing anything else
  -f FILE       manifest file [default=anvil.json]
  -j N          run N actions in parallel [default derived from CPU count]
  -d MODE       enable debugging (use '-d MODE' multiple times)
                  stats          print operation counts/timing info
                  explain        explain what caused each action to run
                  graph=FILE     write the action graph in DOT format
  -v            more logging (repeatable); RUST_LOG overrides
  --executor E  local or distributed
  --no-history  do not compare command lines against the action history
  -h, --help    print this message
";

fn parse_args() -> Result<(Config, usize), pico_args::Error> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{}", USAGE);
        std::process::exit(0);
    }

    let mut verbosity = 0;
    while args.contains("-v") {
        verbosity += 1;
    }
    let mut config = Config {
        execution_dir: args.opt_value_from_str("-C")?,
        parallelism: args.opt_value_from_str("-j")?,
        executor: args.opt_value_from_str("--executor")?,
        no_history: args.contains("--no-history"),
        ..Config::default()
    };
    if let Some(manifest) = args.opt_value_from_str("-f")? {
        config.manifest = manifest;
    }
    while let Some(mode) = args.opt_value_from_str("-d")? {
        config.debug_modes.push(mode);
    }
    config.targets = args.free()?;
    Ok((config, verbosity))
}

fn main() -> anyhow::Result<()> {
    let (config, verbosity) = parse_args().context("parsing arguments")?;

    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(config)
}
