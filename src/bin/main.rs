use std::process;

use clap::CommandFactory;
use tracing::{error, info};

use hearth::{
    cli::{Cli, parse_args, parse_exit_code},
    constants::{STARTUP_FAILURE_EXIT_CODE, USAGE_EXIT_CODE},
    context::AppContext,
    crash::CrashReporter,
    lifecycle::{DefaultSubsystems, Orchestrator},
    logs::init_logging,
    signals::SignalRouter,
};

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            process::exit(parse_exit_code(&err));
        }
    };

    let ctx = match AppContext::from_cli(&args) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("error: {err}\n\n{}", Cli::command().render_usage());
            process::exit(USAGE_EXIT_CODE);
        }
    };

    init_logging(ctx.log_filter.as_deref(), ctx.service.log_file.as_deref());
    info!("{}", ctx.banner());

    process::exit(run(&ctx));
}

fn run(ctx: &AppContext) -> i32 {
    let router = match SignalRouter::for_process(CrashReporter::new(&ctx.crash_prefix)) {
        Ok(router) => router,
        Err(err) => {
            error!("{err}");
            return STARTUP_FAILURE_EXIT_CODE;
        }
    };

    let mut orchestrator = Orchestrator::new(ctx, DefaultSubsystems, router);
    match orchestrator.run() {
        Ok(code) => code,
        Err(err) => {
            error!("Startup failed: {err}");
            STARTUP_FAILURE_EXIT_CODE
        }
    }
}
