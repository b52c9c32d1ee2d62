//! Import and hot-API scanning.
//!
//! Walks the oxc AST once and copies everything the rewriter needs into owned
//! records, so no AST or allocator outlives this module.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, ArrayExpressionElement, CallExpression, ExportAllDeclaration,
    ExportNamedDeclaration, Expression, ImportDeclaration, ImportExpression, StringLiteral,
};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::{Parser, ParserReturn};
use oxc_span::{GetSpan, SourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Static,
    ReExport,
    Dynamic,
}

/// A string literal's contents and the byte range between its quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub value: String,
    pub start: u32,
    pub end: u32,
}

impl Literal {
    fn from_ast(lit: &StringLiteral<'_>) -> Self {
        Self {
            value: lit.value.to_string(),
            start: lit.span.start + 1,
            end: lit.span.end.saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub kind: ImportKind,
    pub specifier: Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotMethod {
    Accept,
    Dispose,
}

impl HotMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HotMethod::Accept => "accept",
            HotMethod::Dispose => "dispose",
        }
    }
}

/// What a hot call's effective first argument declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotTarget {
    /// No argument or a callback: the calling module accepts itself.
    SelfAccept,
    /// A dependency literal or an array of them.
    Deps(Vec<Literal>),
    /// An array element or argument that is not a literal or function.
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotCall {
    pub method: HotMethod,
    pub target: HotTarget,
    /// Offset where the importer path goes; `None` when already injected.
    pub inject_at: Option<u32>,
    /// Whether the importer is injected twice (self-accept marker).
    pub inject_self: bool,
    /// Whether any argument follows the injection point.
    pub has_args: bool,
    /// Byte offset of the call, for diagnostics.
    pub offset: u32,
}

#[derive(Debug, Default)]
pub struct Scan {
    pub imports: Vec<ImportRecord>,
    pub hot_calls: Vec<HotCall>,
    /// Offsets of `import()` calls whose argument is not a string literal.
    pub non_literal_dynamic: Vec<u32>,
}

/// Parse failure details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub messages: Vec<String>,
}

/// Source type from the importer path; anything unknown parses as ESM.
pub fn source_type_for(public_path: &str) -> SourceType {
    let path = crate::paths::clean_url(public_path);
    SourceType::from_path(path)
        .map(|source_type| source_type.with_module(true))
        .unwrap_or_else(|_| SourceType::mjs())
}

/// Scan `source` for imports and hot-API calls.
pub fn scan(source: &str, importer: &str) -> Result<Scan, ScanError> {
    let allocator = Allocator::default();
    let ParserReturn {
        program,
        errors,
        panicked,
        ..
    } = Parser::new(&allocator, source, source_type_for(importer)).parse();

    if panicked || !errors.is_empty() {
        return Err(ScanError {
            messages: errors.iter().map(|e| e.to_string()).collect(),
        });
    }

    let mut scanner = Scanner {
        importer,
        scan: Scan::default(),
    };
    scanner.visit_program(&program);
    Ok(scanner.scan)
}

struct Scanner<'s> {
    importer: &'s str,
    scan: Scan,
}

impl Scanner<'_> {
    fn push(&mut self, kind: ImportKind, lit: &StringLiteral<'_>) {
        self.scan.imports.push(ImportRecord {
            kind,
            specifier: Literal::from_ast(lit),
        });
    }

    fn hot_call(&self, call: &CallExpression<'_>) -> Option<HotCall> {
        let Expression::StaticMemberExpression(member) = &call.callee else {
            return None;
        };
        let method = match member.property.name.as_str() {
            "accept" => HotMethod::Accept,
            "dispose" => HotMethod::Dispose,
            _ => return None,
        };
        if !is_hot_object(&member.object) {
            return None;
        }

        let offset = call.span.start;
        let mut args = call.arguments.iter().peekable();

        // `hot.accept("/self.js", ...)` was produced by an earlier rewrite
        let already_injected = match call.arguments.first() {
            Some(Argument::StringLiteral(lit)) => {
                lit.value.as_str() == self.importer && call.arguments.len() >= 2
            }
            _ => false,
        };
        if already_injected {
            args.next();
        }

        let first = args.peek().copied();
        let inject_at = if already_injected {
            None
        } else {
            // before the first argument, or before `)` of an empty call
            Some(first.map_or(call.span.end.saturating_sub(1), |arg| arg.span().start))
        };

        let target = match first {
            None => HotTarget::SelfAccept,
            Some(Argument::StringLiteral(lit)) if lit.value.as_str() == self.importer => {
                HotTarget::SelfAccept
            }
            Some(Argument::StringLiteral(lit)) => HotTarget::Deps(vec![Literal::from_ast(lit)]),
            Some(Argument::ArrayExpression(array)) => {
                let mut deps = Vec::with_capacity(array.elements.len());
                let mut malformed = false;
                for element in &array.elements {
                    match element {
                        ArrayExpressionElement::StringLiteral(lit) => {
                            deps.push(Literal::from_ast(lit))
                        }
                        ArrayExpressionElement::Elision(_) => {}
                        _ => malformed = true,
                    }
                }
                if malformed {
                    HotTarget::Malformed
                } else {
                    HotTarget::Deps(deps)
                }
            }
            Some(Argument::FunctionExpression(_) | Argument::ArrowFunctionExpression(_)) => {
                HotTarget::SelfAccept
            }
            Some(_) => HotTarget::Malformed,
        };

        // a callback or empty self-accept also gets the importer as its dep
        let inject_self = method == HotMethod::Accept
            && inject_at.is_some()
            && matches!(
                first,
                None | Some(Argument::FunctionExpression(_) | Argument::ArrowFunctionExpression(_))
            );

        Some(HotCall {
            method,
            target,
            inject_at,
            inject_self,
            has_args: first.is_some(),
            offset,
        })
    }
}

/// `hot` or `import.meta.hot`.
fn is_hot_object(object: &Expression<'_>) -> bool {
    match object {
        Expression::Identifier(ident) => ident.name.as_str() == "hot",
        Expression::StaticMemberExpression(member) => {
            member.property.name.as_str() == "hot"
                && matches!(
                    &member.object,
                    Expression::MetaProperty(meta)
                        if meta.meta.name.as_str() == "import"
                            && meta.property.name.as_str() == "meta"
                )
        }
        _ => false,
    }
}

impl<'a> Visit<'a> for Scanner<'_> {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        if !decl.import_kind.is_type() {
            self.push(ImportKind::Static, &decl.source);
        }
        walk::walk_import_declaration(self, decl);
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            if !decl.export_kind.is_type() {
                self.push(ImportKind::ReExport, source);
            }
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        if !decl.export_kind.is_type() {
            self.push(ImportKind::ReExport, &decl.source);
        }
        walk::walk_export_all_declaration(self, decl);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        match &expr.source {
            Expression::StringLiteral(lit) => self.push(ImportKind::Dynamic, lit),
            _ => self.scan.non_literal_dynamic.push(expr.span.start),
        }
        walk::walk_import_expression(self, expr);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Some(hot) = self.hot_call(call) {
            self.scan.hot_calls.push(hot);
        }
        walk::walk_call_expression(self, call);
    }
}
