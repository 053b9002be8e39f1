//! Python function extraction using tree-sitter
//!
//! Extracts every function definition (ordinary and async, including methods and
//! nested functions) with its parameters, return type, docstring, decorators and
//! business rule markers.

use super::syntax::{NodeRole, SyntaxNode};
use super::{scan_markers, EntityKind, SourceEntity};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A single declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name, including `*` / `**` for splats
    pub name: String,
    /// Declared type annotation
    pub type_annotation: Option<String>,
    /// Default value expression
    pub default: Option<String>,
}

impl Parameter {
    /// Render the parameter the way it appears in a signature
    pub fn render(&self) -> String {
        let mut out = self.name.clone();
        if let Some(ref ty) = self.type_annotation {
            out.push_str(": ");
            out.push_str(ty);
        }
        if let Some(ref default) = self.default {
            if self.type_annotation.is_some() {
                out.push_str(" = ");
            } else {
                out.push('=');
            }
            out.push_str(default);
        }
        out
    }
}

/// A function definition extracted from Python source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionEntity {
    /// Function name
    pub name: String,
    /// File path relative to the source root
    pub file_path: String,
    /// Line number where the definition starts
    pub start_line: usize,
    /// Line number where the definition ends
    pub end_line: usize,
    /// Verbatim source of the definition
    pub source_code: String,
    /// Explicit business rule annotations
    pub business_rule_markers: Vec<String>,
    /// Canonical reconstructed signature
    pub signature: String,
    /// Declared parameters, without an implicit `self` / `cls`
    pub parameters: Vec<Parameter>,
    /// Declared return type
    pub return_type: Option<String>,
    /// Leading docstring, quotes stripped
    pub docstring: Option<String>,
    /// Decorators in source order, without the `@`
    pub decorators: Vec<String>,
    /// Whether this is an `async def`
    pub is_async: bool,
}

impl SourceEntity for FunctionEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Function
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn file_path(&self) -> &str {
        &self.file_path
    }

    fn source_code(&self) -> &str {
        &self.source_code
    }

    fn business_rule_markers(&self) -> &[String] {
        &self.business_rule_markers
    }

    fn description(&self) -> Option<&str> {
        self.docstring.as_deref()
    }
}

/// Rebuild a canonical signature from its parts
pub fn build_signature(
    name: &str,
    parameters: &[Parameter],
    return_type: Option<&str>,
    is_async: bool,
) -> String {
    let params = parameters
        .iter()
        .map(Parameter::render)
        .collect::<Vec<_>>()
        .join(", ");
    let prefix = if is_async { "async def" } else { "def" };

    match return_type {
        Some(ret) => format!("{} {}({}) -> {}", prefix, name, params, ret),
        None => format!("{} {}({})", prefix, name, params),
    }
}

/// Extracts function entities from Python files
pub struct PythonExtractor {
    parser: tree_sitter::Parser,
}

impl PythonExtractor {
    /// Create a new extractor with the Python grammar loaded
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .context("Failed to set Python language")?;

        Ok(Self { parser })
    }

    /// Extract all functions from one file's content
    pub fn extract_source(&mut self, file_path: &str, content: &str) -> Result<Vec<FunctionEntity>> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| anyhow::anyhow!("Failed to parse Python file"))?;

        let mut functions = Vec::new();
        walk(tree.root_node(), content, file_path, Vec::new(), &mut functions);

        Ok(functions)
    }
}

/// Walk the tree, applying the traversal rule for each node role
fn walk<N: SyntaxNode>(
    node: N,
    source: &str,
    file_path: &str,
    decorators: Vec<String>,
    functions: &mut Vec<FunctionEntity>,
) {
    match NodeRole::of_python(node.node_kind()) {
        NodeRole::Function => {
            if let Some(function) = build_function(node, source, file_path, decorators) {
                functions.push(function);
            }
            if let Some(body) = node.field("body") {
                for child in body.child_nodes() {
                    walk(child, source, file_path, Vec::new(), functions);
                }
            }
        }
        NodeRole::Class => {
            if let Some(body) = node.field("body") {
                for child in body.child_nodes() {
                    walk(child, source, file_path, Vec::new(), functions);
                }
            }
        }
        NodeRole::Decorated => {
            let decorators = node
                .child_nodes()
                .into_iter()
                .filter(|child| child.node_kind() == "decorator")
                .map(|child| child.text(source).trim().trim_start_matches('@').trim().to_string())
                .collect();

            if let Some(definition) = node.field("definition") {
                walk(definition, source, file_path, decorators, functions);
            }
        }
        NodeRole::Other => {
            for child in node.child_nodes() {
                walk(child, source, file_path, Vec::new(), functions);
            }
        }
    }
}

fn build_function<N: SyntaxNode>(
    node: N,
    source: &str,
    file_path: &str,
    decorators: Vec<String>,
) -> Option<FunctionEntity> {
    let name = node.field("name")?.text(source).to_string();
    let source_code = node.text(source).to_string();
    let (start_line, end_line) = node.line_span();

    let is_async = node
        .child_nodes()
        .iter()
        .any(|child| child.node_kind() == "async");

    let parameters = node
        .field("parameters")
        .map(|params| extract_parameters(params, source))
        .unwrap_or_default();

    let return_type = node
        .field("return_type")
        .map(|ret| ret.text(source).trim().to_string());

    let docstring = extract_docstring(node, source);

    let business_rule_markers = scan_markers(
        docstring
            .as_deref()
            .into_iter()
            .chain(std::iter::once(source_code.as_str())),
    );

    let signature = build_signature(&name, &parameters, return_type.as_deref(), is_async);

    Some(FunctionEntity {
        name,
        file_path: file_path.to_string(),
        start_line,
        end_line,
        source_code,
        business_rule_markers,
        signature,
        parameters,
        return_type,
        docstring,
        decorators,
        is_async,
    })
}

/// Extract parameters, dropping a leading implicit `self` / `cls`
fn extract_parameters<N: SyntaxNode>(params: N, source: &str) -> Vec<Parameter> {
    let mut parameters = Vec::new();

    for child in params.child_nodes() {
        let parameter = match child.node_kind() {
            "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => Parameter {
                name: child.text(source).to_string(),
                type_annotation: None,
                default: None,
            },
            "typed_parameter" => {
                // The name has no field in this node; it is the first named child
                let name = child
                    .child_nodes()
                    .into_iter()
                    .find(|c| c.is_named_node() && c.node_kind() != "type")
                    .map(|c| c.text(source).to_string())
                    .unwrap_or_default();
                Parameter {
                    name,
                    type_annotation: child.field("type").map(|t| t.text(source).to_string()),
                    default: None,
                }
            }
            "default_parameter" | "typed_default_parameter" => Parameter {
                name: child
                    .field("name")
                    .map(|n| n.text(source).to_string())
                    .unwrap_or_default(),
                type_annotation: child.field("type").map(|t| t.text(source).to_string()),
                default: child.field("value").map(|v| v.text(source).to_string()),
            },
            _ => continue,
        };

        if parameter.name.is_empty() {
            continue;
        }
        parameters.push(parameter);
    }

    if parameters
        .first()
        .is_some_and(|p| p.name == "self" || p.name == "cls")
    {
        parameters.remove(0);
    }

    parameters
}

/// Extract the docstring: the first body statement, if it is a bare string
fn extract_docstring<N: SyntaxNode>(node: N, source: &str) -> Option<String> {
    let body = node.field("body")?;

    let first = body
        .child_nodes()
        .into_iter()
        .find(|child| child.is_named_node() && child.node_kind() != "comment")?;

    if first.node_kind() != "expression_statement" {
        return None;
    }

    let children = first.child_nodes();
    let [string] = children.as_slice() else {
        return None;
    };
    if string.node_kind() != "string" {
        return None;
    }

    Some(strip_string_literal(string.text(source)).trim().to_string())
}

/// Strip a Python string literal's prefix and quote delimiters
pub fn strip_string_literal(literal: &str) -> &str {
    let unprefixed = literal.trim_start_matches(|c: char| "rRbBuUfF".contains(c));

    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = unprefixed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner;
        }
    }

    unprefixed
}
