//! Generic view over concrete syntax tree nodes
//!
//! The function extractor walks the tree through this small capability set
//! instead of calling tree-sitter directly, and decides what to do with a node
//! from its [`NodeRole`] rather than from kind strings scattered through the walk.

/// The capabilities a tree walk needs from a node
pub trait SyntaxNode: Copy {
    /// Grammar node type
    fn node_kind(&self) -> &str;

    /// All direct children, in source order
    fn child_nodes(&self) -> Vec<Self>;

    /// Named-field child lookup
    fn field(&self, name: &str) -> Option<Self>;

    /// Source text covered by this node
    fn text<'s>(&self, source: &'s str) -> &'s str;

    /// 1-indexed inclusive line span
    fn line_span(&self) -> (usize, usize);

    /// Whether this is a named (non-punctuation) node
    fn is_named_node(&self) -> bool;
}

impl<'tree> SyntaxNode for tree_sitter::Node<'tree> {
    fn node_kind(&self) -> &str {
        self.kind()
    }

    fn child_nodes(&self) -> Vec<Self> {
        let mut cursor = self.walk();
        self.children(&mut cursor).collect()
    }

    fn field(&self, name: &str) -> Option<Self> {
        self.child_by_field_name(name)
    }

    fn text<'s>(&self, source: &'s str) -> &'s str {
        self.utf8_text(source.as_bytes()).unwrap_or("")
    }

    fn line_span(&self) -> (usize, usize) {
        (self.start_position().row + 1, self.end_position().row + 1)
    }

    fn is_named_node(&self) -> bool {
        self.is_named()
    }
}

/// How the function walk treats a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// `def` / `async def`: an entity; its body is walked for nested functions
    Function,
    /// `class`: never an entity; its body is walked so methods are hoisted
    Class,
    /// `@decorator` wrapper: decorators attach to the wrapped definition
    Decorated,
    /// Anything else: walk all children
    Other,
}

impl NodeRole {
    /// Classify a Python grammar node kind
    pub fn of_python(kind: &str) -> Self {
        match kind {
            "function_definition" => NodeRole::Function,
            "class_definition" => NodeRole::Class,
            "decorated_definition" => NodeRole::Decorated,
            _ => NodeRole::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_roles() {
        assert_eq!(NodeRole::of_python("function_definition"), NodeRole::Function);
        assert_eq!(NodeRole::of_python("class_definition"), NodeRole::Class);
        assert_eq!(NodeRole::of_python("decorated_definition"), NodeRole::Decorated);
        assert_eq!(NodeRole::of_python("if_statement"), NodeRole::Other);
    }

    #[test]
    fn test_tree_sitter_node_capabilities() {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .unwrap();
        let source = "def f(x):\n    return x\n";
        let tree = parser.parse(source, None).unwrap();
        let root = tree.root_node();

        let function = root.child_nodes()[0];
        assert_eq!(function.node_kind(), "function_definition");
        assert_eq!(function.line_span(), (1, 2));
        assert_eq!(function.field("name").unwrap().text(source), "f");
    }
}
