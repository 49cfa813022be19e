//! Share command implementation
//!
//! Runs container A with private network and user namespaces, then container
//! B joining both of them while keeping every other namespace to itself.
//! Each container runs the command with a pipe on stdin; closing the pipe
//! ends it.

use anyhow::{bail, Context, Result};
use nix::fcntl::OFlag;
use nix::unistd::{pipe2, Uid};
use std::os::fd::OwnedFd;
use std::sync::Arc;
use tandem_cgroup::{CgroupPath, HierarchyProvider};
use tandem_container::{
    Container, ContainerConfig, ExitHandle, ExitResult, Factory, Process, ProcessSupervisor,
    StateSnapshot,
};
use tandem_core::ContainerId;
use tandem_namespace::{IdMapping, NamespaceKind, NamespaceSet};
use tracing::info;

use crate::cli::ShareArgs;

const SHARED: [NamespaceKind; 2] = [NamespaceKind::Network, NamespaceKind::User];

/// A running container process and the write end of its stdin
struct Running {
    id: ContainerId,
    stdin: OwnedFd,
    exit: ExitHandle,
}

impl Running {
    async fn start(container: &mut Container, args: &ShareArgs) -> Result<Self> {
        let (read, stdin) = pipe2(OFlag::O_CLOEXEC).context("Failed to create stdin pipe")?;
        let mut process = Process::new(args.command.iter().cloned())
            .with_env(Process::standard_environment())
            .with_stdin(read);

        container
            .run(&mut process)
            .await
            .with_context(|| format!("Failed to run {}", container.id()))?;

        Ok(Self {
            id: container.id().clone(),
            stdin,
            exit: ProcessSupervisor::spawn(process),
        })
    }

    /// Close stdin and wait for the process to end
    async fn close(self) -> Result<ExitResult> {
        let Self { id, stdin, exit } = self;
        drop(stdin);

        let result = exit
            .wait()
            .await
            .with_context(|| format!("Failed to wait for {id}"))?;
        info!(container_id = %id, %result, "Process finished");

        Ok(result)
    }
}

/// What the workflow observed before teardown
struct Outcome {
    mismatch: Option<NamespaceKind>,
    result_a: ExitResult,
    result_b: ExitResult,
}

fn state_of(container: &Container) -> Result<StateSnapshot> {
    container
        .state()
        .with_context(|| format!("Failed to get state of {}", container.id()))
}

pub async fn execute(args: ShareArgs) -> Result<()> {
    if !Uid::effective().is_root() {
        bail!("Must run as root (try: sudo tandem share ...)");
    }

    let factory = Factory::new(Arc::new(HierarchyProvider::new(&args.cgroup_root)));

    // Every created container is torn down, whichever way the workflow ends
    let mut containers = Vec::new();
    let outcome = share(&factory, &args, &mut containers).await;
    let teardown = factory.teardown().destroy_all(&mut containers).await;

    let outcome = outcome?;
    teardown.context("Failed to tear down containers")?;

    if let Some(kind) = outcome.mismatch {
        bail!("The {kind} namespace was not allocated as configured");
    }
    if !outcome.result_b.success() || !outcome.result_a.success() {
        bail!(
            "Processes did not finish cleanly: A {}, B {}",
            outcome.result_a,
            outcome.result_b
        );
    }

    println!("\n✅ Network and user namespaces shared, all others separate");
    Ok(())
}

async fn share(
    factory: &Factory,
    args: &ShareArgs,
    containers: &mut Vec<Container>,
) -> Result<Outcome> {
    let lender_config = ContainerConfig::builder(&args.rootfs)
        .with_namespaces(
            NamespaceSet::isolated()
                .with_private(NamespaceKind::User)
                .with_private(NamespaceKind::Network),
        )
        .with_uid_mapping(IdMapping::new(0, 0, 1000))
        .with_gid_mapping(IdMapping::new(0, 0, 1000))
        .build()?;

    containers.push(factory.create_generated(lender_config).await?);
    let a = Running::start(&mut containers[0], args).await?;
    let state_a = state_of(&containers[0])?;

    let mut namespaces = NamespaceSet::isolated();
    for kind in SHARED {
        let path = state_a
            .namespace_path(kind)
            .with_context(|| format!("No {kind} namespace recorded for A"))?;
        namespaces = namespaces.with_shared(kind, path);
    }

    let borrower_config = ContainerConfig::builder(&args.rootfs)
        .with_namespaces(namespaces)
        .with_cgroup_path(CgroupPath::new(&args.cgroup_path)?)
        .build()?;

    containers.push(factory.create("testCT2", borrower_config).await?);
    let b = Running::start(&mut containers[1], args).await?;
    let state_b = state_of(&containers[1])?;

    println!("{}", serde_json::to_string_pretty(&state_a)?);
    println!("{}", serde_json::to_string_pretty(&state_b)?);

    let mut mismatch = None;
    for kind in NamespaceKind::ORDERED {
        let identity_a = state_a.namespace_identity(kind)?;
        let identity_b = state_b.namespace_identity(kind)?;
        let shared = SHARED.contains(&kind);

        println!(
            "{:<8} {identity_a:<22} {identity_b:<22} {}",
            kind.proc_name(),
            if shared { "shared" } else { "separate" }
        );

        if shared != (identity_a == identity_b) {
            mismatch.get_or_insert(kind);
        }
    }

    // B borrows from A, so B goes first
    let result_b = b.close().await?;
    let result_a = a.close().await?;

    Ok(Outcome {
        mismatch,
        result_a,
        result_b,
    })
}
