use vergen_gitcl::{Emitter, GitclBuilder};

/// Emits `VERGEN_GIT_SHA` and `VERGEN_GIT_BRANCH` for the `--version` output of the binary.
fn main() -> anyhow::Result<()> {
    let git = GitclBuilder::default().branch(true).sha(true).build()?;
    Emitter::default().add_instructions(&git)?.emit()?;
    Ok(())
}
