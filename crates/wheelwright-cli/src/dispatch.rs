use std::thread;

use tracing::debug;
use wheelwright_core::{
    add_suffix, organize, outcome_from_error, release, set_description, verify_wheels,
    CommandContext, DescriptionRequest, ExecutionOutcome, OrganizeRequest, ReleaseRequest,
    SuffixRequest, VerifyRequest,
};

use crate::cli::{CommandGroupCli, ReleaseArgs};

pub fn dispatch_command(ctx: &CommandContext, group: &CommandGroupCli) -> ExecutionOutcome {
    debug!(command = group.name(), "dispatching");
    match group {
        CommandGroupCli::Release(args) => {
            let request = release_request_from_args(args);
            core_call(|| release(ctx, &request))
        }
        CommandGroupCli::Verify(args) => {
            let request = VerifyRequest {
                paths: args.paths.clone(),
                jobs: args.jobs.unwrap_or_else(default_jobs),
            };
            core_call(|| verify_wheels(ctx, &request))
        }
        CommandGroupCli::SetDescription(args) => {
            let request = DescriptionRequest {
                wheel: args.wheel.clone(),
                file: args.file.clone(),
            };
            core_call(|| set_description(ctx, &request))
        }
        CommandGroupCli::AddSuffix(args) => {
            let request = SuffixRequest {
                wheel: args.wheel.clone(),
                suffix: args.suffix.clone(),
            };
            core_call(|| add_suffix(ctx, &request))
        }
        CommandGroupCli::Organize(args) => {
            let request = OrganizeRequest {
                dir: args.dir.clone(),
            };
            core_call(|| organize(ctx, &request))
        }
    }
}

fn release_request_from_args(args: &ReleaseArgs) -> ReleaseRequest {
    ReleaseRequest {
        catalog: args.catalog.clone(),
        variant: args.variant.clone(),
        versions: args.versions.clone(),
        runtimes: args.python.clone(),
        platform: args.platform,
        backend: args.backend,
        out_dir: args.out_dir.clone(),
        jobs: args.jobs.unwrap_or_else(default_jobs),
        skip_build: args.skip_build,
        skip_release: args.skip_release,
        version_suffix: args.version_suffix.clone(),
        dry_run: args.dry_run,
    }
}

fn default_jobs() -> usize {
    thread::available_parallelism().map_or(1, usize::from)
}

fn core_call<F>(action: F) -> ExecutionOutcome
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    action().unwrap_or_else(|err| outcome_from_error(&err))
}
