//! Code-structure rules: idiomatic entry-point and module shapes per tag.
//!
//! The table is evaluated top to bottom. A rule is skipped when its tag filter
//! rejects the block's tag; the first rule whose pattern matches and whose
//! name is produced (and valid) wins.
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::filename::to_snake_case;
use super::Confidence::{High, Low, Medium};
use super::ContentTag as T;
use super::{Confidence, ContentTag, DetectionResult, DetectionSource};
use self::RuleName::{Derived, Fixed};
use self::TagFilter::{OneOf, Only};

pub enum TagFilter {
    Only(ContentTag),
    OneOf(&'static [ContentTag]),
}

impl TagFilter {
    pub fn admits(&self, tag: ContentTag) -> bool {
        match self {
            TagFilter::Only(only) => *only == tag,
            TagFilter::OneOf(tags) => tags.contains(&tag),
        }
    }
}

pub enum RuleName {
    Fixed(&'static str),
    /// Derived from the match; `None` means "not this rule after all".
    Derived(fn(&Captures<'_>, ContentTag) -> Option<String>),
}

pub struct Rule {
    pub pattern: &'static str,
    pub tags: TagFilter,
    pub name: RuleName,
    pub confidence: Confidence,
}

const fn rule(
    pattern: &'static str,
    tags: TagFilter,
    name: RuleName,
    confidence: Confidence,
) -> Rule {
    Rule {
        pattern,
        tags,
        name,
        confidence,
    }
}

const SCRIPT_TAGS: &[ContentTag] = &[ContentTag::JavaScript, ContentTag::TypeScript];

fn snake_rs(caps: &Captures<'_>, _: ContentTag) -> Option<String> {
    Some(format!("{}.rs", to_snake_case(&caps[1])))
}

fn snake_py(caps: &Captures<'_>, _: ContentTag) -> Option<String> {
    Some(format!("{}.py", to_snake_case(&caps[1])))
}

/// Capitalised functions are components: `Button.tsx` / `Button.jsx`.
fn component(caps: &Captures<'_>, tag: ContentTag) -> Option<String> {
    let name = &caps[1];
    if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
        return None;
    }
    let ext = if tag == ContentTag::TypeScript { "tsx" } else { "jsx" };
    Some(format!("{name}.{ext}"))
}

fn default_export(caps: &Captures<'_>, _: ContentTag) -> Option<String> {
    Some(format!("{}.js", &caps[1]))
}

pub static RULES: &[Rule] = &[
    // Rust
    rule(r"(?m)^fn\s+main\s*\(", Only(T::Rust), Fixed("main.rs"), High),
    rule(r"(?m)^#\[\s*cfg\(test\)\s*\]", Only(T::Rust), Fixed("lib.rs"), Medium),
    rule(r"(?m)^pub\s+mod\s+", Only(T::Rust), Fixed("lib.rs"), Medium),
    rule(r"(?m)^mod\s+tests\s*\{", Only(T::Rust), Fixed("lib.rs"), Medium),
    rule(r"(?m)^(?:pub\s+)?struct\s+([A-Za-z0-9_]+)", Only(T::Rust), Derived(snake_rs), Low),
    // Python
    rule(r#"(?m)^if\s+__name__\s*==\s*['"]__main__['"]"#, Only(T::Python), Fixed("main.py"), High),
    rule(r"(?m)^from\s+flask\s+import", Only(T::Python), Fixed("app.py"), Medium),
    rule(r"(?m)^from\s+django", Only(T::Python), Fixed("views.py"), Low),
    rule(r"(?m)^import\s+pytest", Only(T::Python), Fixed("test_main.py"), Medium),
    rule(r"(?m)^def\s+test_", Only(T::Python), Fixed("test_main.py"), Medium),
    rule(r"(?m)^class\s+([A-Za-z0-9_]+)(?:\(.*\))?:", Only(T::Python), Derived(snake_py), Low),
    // JavaScript / TypeScript
    rule(r#"(?m)^['"]use client['"]"#, OneOf(SCRIPT_TAGS), Fixed("page.tsx"), Medium),
    rule(r#"(?m)^['"]use server['"]"#, Only(T::JavaScript), Fixed("actions.ts"), Medium),
    rule(
        r"(?m)^(?:export\s+)?(?:default\s+)?function\s+([A-Za-z0-9_]+)",
        OneOf(SCRIPT_TAGS),
        Derived(component),
        Medium,
    ),
    rule(
        r"(?m)^export\s+default\s+function\s+([A-Za-z0-9_]+)",
        Only(T::JavaScript),
        Derived(default_export),
        Low,
    ),
    // Go
    rule(r"(?m)^package\s+main\b", Only(T::Go), Fixed("main.go"), High),
    rule(r"(?m)^func\s+Test[A-Za-z0-9_]+\s*\(", Only(T::Go), Fixed("main_test.go"), Medium),
    // Config
    rule(r"(?m)^\[package\]\s*$", Only(T::Toml), Fixed("Cargo.toml"), High),
    rule(r"(?m)^\[dependencies\]", Only(T::Toml), Fixed("Cargo.toml"), Medium),
    rule(r"(?m)^\[tool\.poetry\]", Only(T::Toml), Fixed("pyproject.toml"), High),
    rule(r"(?m)^\[build-system\]", Only(T::Toml), Fixed("pyproject.toml"), Medium),
    rule(
        r#"(?m)^\{\s*"name"\s*:\s*"[^"]+"\s*,\s*"version""#,
        Only(T::Json),
        Fixed("package.json"),
        High,
    ),
    rule(r#"(?m)^\{\s*"compilerOptions""#, Only(T::Json), Fixed("tsconfig.json"), High),
    rule(r#""manifest_version"\s*:\s*\d"#, Only(T::Json), Fixed("manifest.json"), High),
    rule(r#"(?m)^\{\s*"scripts"\s*:"#, Only(T::Json), Fixed("package.json"), Medium),
    rule(r#"(?m)^version:\s*['"]?\d"#, Only(T::Yaml), Fixed("docker-compose.yml"), Low),
    rule(r"(?m)^services:\s*$", Only(T::Yaml), Fixed("docker-compose.yml"), Medium),
    rule(r"(?m)^apiVersion:\s*apps/v1", Only(T::Yaml), Fixed("deployment.yaml"), Medium),
    rule(r"(?m)^@tailwind", Only(T::Css), Fixed("globals.css"), Medium),
    // Markup, anchored at the very start of the block
    rule(r"(?i)^<!DOCTYPE html>", Only(T::Html), Fixed("index.html"), Medium),
    rule(r"(?i)^<html", Only(T::Html), Fixed("index.html"), Low),
    // Shell
    rule(r"(?m)^#!/usr/bin/env\s+bash", Only(T::Shell), Fixed("script.sh"), Medium),
    rule(r"(?m)^#!/bin/bash", Only(T::Shell), Fixed("script.sh"), Medium),
    rule(r"(?m)^#!/usr/bin/env\s+sh", Only(T::Shell), Fixed("script.sh"), Medium),
    rule(r"(?m)^#!/usr/bin/env\s+zsh", Only(T::Shell), Fixed("script.zsh"), Medium),
    // CSS
    rule(r"(?m)^:root\s*\{", Only(T::Css), Fixed("styles.css"), Low),
    // SQL
    rule(r"(?im)^CREATE\s+TABLE", Only(T::Sql), Fixed("schema.sql"), Medium),
    rule(r"(?im)^CREATE\s+DATABASE", Only(T::Sql), Fixed("init.sql"), Medium),
    rule(r"(?im)^INSERT\s+INTO", Only(T::Sql), Fixed("seed.sql"), Low),
];

static COMPILED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|r| Regex::new(r.pattern).expect("static rule pattern"))
        .collect()
});

/// Stage 4 of the cascade.
pub fn match_structure(code: &str, tag: ContentTag) -> Option<DetectionResult> {
    for (rule, re) in RULES.iter().zip(COMPILED.iter()) {
        if !rule.tags.admits(tag) {
            continue;
        }
        let Some(caps) = re.captures(code) else {
            continue;
        };
        let name = match &rule.name {
            Fixed(name) => (*name).to_string(),
            Derived(derive) => match derive(&caps, tag) {
                Some(name) => name,
                None => continue,
            },
        };
        if let Some(result) =
            DetectionResult::checked(&name, DetectionSource::CodeStructure, rule.confidence)
        {
            return Some(result);
        }
    }
    None
}
