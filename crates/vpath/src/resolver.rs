use std::collections::VecDeque;

use crate::builder::Builder;
use crate::component::Component;
use crate::error::ResolveError;
use crate::walker::{
    AbsoluteWalker, ComponentWalker, GotDirectoryOrSymlink, LexicalWalker, RelativeWalker,
};

/// Maximum number of symbolic links expanded while resolving a single path.
pub const MAX_SYMLINK_EXPANSIONS: usize = 40;

#[derive(Debug)]
enum Step {
    Up,
    Directory(Component),
    Terminal(Component),
}

/// Splits `path` into steps, returning whether it is absolute.
fn parse(path: &str) -> Result<(bool, Vec<Step>), ResolveError> {
    let absolute = path.starts_with('/');
    let raw: Vec<&str> = path.split('/').collect();
    let last = raw.len() - 1;
    let mut steps = Vec::with_capacity(raw.len());
    for (index, part) in raw.into_iter().enumerate() {
        match part {
            "" | "." => {}
            ".." => steps.push(Step::Up),
            name => {
                let component = Component::new(name)?;
                if index == last {
                    steps.push(Step::Terminal(component));
                } else {
                    steps.push(Step::Directory(component));
                }
            }
        }
    }
    Ok((absolute, steps))
}

/// Resolves `path` by driving `walker` component by component.
///
/// Symbolic links returned by the walker are expanded in place. A link found
/// in a directory position has its final component treated as a directory,
/// as more components follow it.
pub fn resolve<W: ComponentWalker>(path: &str, walker: &mut W) -> Result<(), W::Error> {
    let (absolute, steps) = parse(path)?;
    walker.on_scope(absolute)?;
    let mut pending: VecDeque<Step> = steps.into();
    let mut expansions = 0;

    while let Some(step) = pending.pop_front() {
        let (target, in_directory_position) = match step {
            Step::Up => {
                walker.on_up()?;
                continue;
            }
            Step::Directory(name) => match walker.on_directory(&name)? {
                GotDirectoryOrSymlink::Directory { .. } => continue,
                GotDirectoryOrSymlink::Symlink(symlink) => (symlink.target, true),
            },
            Step::Terminal(name) => match walker.on_terminal(&name)? {
                None => continue,
                Some(symlink) => (symlink.target, false),
            },
        };

        expansions += 1;
        if expansions > MAX_SYMLINK_EXPANSIONS {
            return Err(ResolveError::TooManySymbolicLinks.into());
        }
        let (target_absolute, target_steps) = parse(&target)?;
        walker.on_scope(target_absolute)?;
        for step in target_steps.into_iter().rev() {
            let step = match step {
                Step::Terminal(name) if in_directory_position => Step::Directory(name),
                other => other,
            };
            pending.push_front(step);
        }
    }
    Ok(())
}

/// Resolves an absolute path lexically, returning its components.
pub fn resolve_absolute(path: &str) -> Result<Vec<Component>, ResolveError> {
    let mut builder = Builder::new(AbsoluteWalker(LexicalWalker));
    resolve(path, &mut builder)?;
    builder
        .into_components()
        .ok_or_else(|| ResolveError::InvalidComponent("..".to_owned()))
}

/// Resolves a relative path lexically, returning its rendered form.
///
/// Leading `..` components are retained, so the result may point above the
/// directory it is relative to.
pub fn resolve_relative(path: &str) -> Result<String, ResolveError> {
    let mut builder = Builder::new(RelativeWalker(LexicalWalker));
    resolve(path, &mut builder)?;
    Ok(builder.to_string())
}
