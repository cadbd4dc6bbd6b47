//! Recursive-descent parser for AWSL source.
//!
//! The parser is pure and deterministic: it yields a [`Workflow`] IR value
//! or fails with a [`ParseError`] carrying position and expected-token
//! information. No expression evaluation happens here; `when` and `guard`
//! clauses are captured as raw text bounded by statement terminators.
//!
//! Keywords are contextual: `workflow`, `node`, `call` and friends are
//! ordinary identifiers everywhere except where the grammar asks for them,
//! so port and node names never collide with the keyword set.

use crate::ast::{
    Constant, Cycle, HitlConfig, Metadata, Node, PortDecl, PortValue, Reducer, RetryConfig, Scalar,
    Step, Workflow, DEFAULT_MAX_ITERATIONS,
};
use crate::error::{ParseError, Result};
use crate::token::{Lexer, Token, TokenKind};

/// Parse a complete AWSL source string into a [`Workflow`].
pub fn parse_workflow(src: &str) -> Result<Workflow> {
    Parser::new(src).workflow()
}

/// Check parseability only. This is what the verifier runs.
pub fn verify(src: &str) -> Result<()> {
    parse_workflow(src).map(|_| ())
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            lexer: Lexer::new(src),
            peeked: None,
        }
    }

    fn next(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(tok) => Ok(tok),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    /// Consume raw expression text. Rewinds past any peeked token first so
    /// the expression starts exactly where the grammar left off.
    fn raw_expr(&mut self) -> String {
        if let Some(tok) = self.peeked.take() {
            self.lexer.rewind_to(tok.span);
        }
        self.lexer.raw_expression()
    }

    fn skip_newlines(&mut self) -> Result<()> {
        while matches!(self.peek()?.kind, TokenKind::Newline) {
            self.next()?;
        }
        Ok(())
    }

    fn skip_separators(&mut self) -> Result<()> {
        while matches!(self.peek()?.kind, TokenKind::Newline | TokenKind::Semi) {
            self.next()?;
        }
        Ok(())
    }

    fn expect_kind(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        let tok = self.next()?;
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(ParseError::syntax(
                tok.span.line,
                tok.span.column,
                tok.kind.describe(),
                &[expected],
            ))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Token)> {
        let tok = self.next()?;
        match &tok.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                Ok((name, tok))
            }
            other => Err(ParseError::syntax(
                tok.span.line,
                tok.span.column,
                other.describe(),
                &[expected],
            )),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Token> {
        let tok = self.next()?;
        match &tok.kind {
            TokenKind::Ident(name) if name == keyword => Ok(tok),
            other => Err(ParseError::syntax(
                tok.span.line,
                tok.span.column,
                other.describe(),
                &[keyword],
            )),
        }
    }

    /// Statement terminator: `;` or newline consumed, `}`/EOF left alone.
    fn expect_terminator(&mut self) -> Result<()> {
        let (kind, span) = {
            let tok = self.peek()?;
            (tok.kind.clone(), tok.span)
        };
        match kind {
            TokenKind::Semi | TokenKind::Newline => {
                self.next()?;
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            other => Err(ParseError::syntax(
                span.line,
                span.column,
                other.describe(),
                &["`;`", "end of line"],
            )),
        }
    }

    fn workflow(&mut self) -> Result<Workflow> {
        self.skip_newlines()?;
        self.expect_keyword("workflow")?;
        let (name, _) = self.expect_ident("workflow name")?;
        self.skip_newlines()?;
        self.expect_kind(TokenKind::LBrace, "`{`")?;

        let mut workflow = Workflow {
            name,
            metadata: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            steps: Vec::new(),
        };

        loop {
            self.skip_separators()?;
            let (kind, span) = {
                let tok = self.peek()?;
                (tok.kind.clone(), tok.span)
            };
            match kind {
                TokenKind::RBrace => {
                    self.next()?;
                    break;
                }
                TokenKind::Ident(ref word) => match word.as_str() {
                    "metadata" => {
                        self.next()?;
                        workflow.metadata = Some(self.metadata_block()?);
                    }
                    "inputs" => {
                        self.next()?;
                        workflow.inputs = self.param_block(false)?;
                    }
                    "outputs" => {
                        self.next()?;
                        workflow.outputs = self.param_block(true)?;
                    }
                    "node" => {
                        self.next()?;
                        workflow.steps.push(Step::Node(self.node_block()?));
                    }
                    "cycle" => {
                        self.next()?;
                        workflow.steps.push(Step::Cycle(self.cycle_block()?));
                    }
                    _ => {
                        return Err(ParseError::syntax(
                            span.line,
                            span.column,
                            kind.describe(),
                            &["metadata", "inputs", "outputs", "node", "cycle", "`}`"],
                        ));
                    }
                },
                other => {
                    return Err(ParseError::syntax(
                        span.line,
                        span.column,
                        other.describe(),
                        &["metadata", "inputs", "outputs", "node", "cycle", "`}`"],
                    ));
                }
            }
        }

        self.skip_separators()?;
        let (kind, span) = {
            let tok = self.peek()?;
            (tok.kind.clone(), tok.span)
        };
        if kind != TokenKind::Eof {
            return Err(ParseError::syntax(
                span.line,
                span.column,
                kind.describe(),
                &["end of input"],
            ));
        }
        Ok(workflow)
    }

    fn metadata_block(&mut self) -> Result<Metadata> {
        self.skip_newlines()?;
        self.expect_kind(TokenKind::LBrace, "`{`")?;
        let mut metadata = Metadata::default();
        loop {
            self.skip_separators()?;
            if matches!(self.peek()?.kind, TokenKind::RBrace) {
                self.next()?;
                break;
            }
            let (key, _) = self.expect_ident("metadata key")?;
            self.expect_kind(TokenKind::Colon, "`:`")?;
            let value = self.scalar_value()?;
            metadata.entries.insert(key, value.display_string());
            self.expect_terminator()?;
        }
        Ok(metadata)
    }

    /// Parse an `inputs { … }` / `outputs { … }` block. In output position
    /// the bare value `append` is the APPEND reducer tag, not a default.
    fn param_block(&mut self, is_output: bool) -> Result<Vec<PortDecl>> {
        self.skip_newlines()?;
        self.expect_kind(TokenKind::LBrace, "`{`")?;
        let mut ports = Vec::new();
        loop {
            self.skip_separators()?;
            while matches!(self.peek()?.kind, TokenKind::Comma) {
                self.next()?;
                self.skip_separators()?;
            }
            if matches!(self.peek()?.kind, TokenKind::RBrace) {
                self.next()?;
                break;
            }

            let (mut ty, _) = self.expect_ident("port type")?;
            let mut optional = false;
            if ty == "optional" && matches!(self.peek()?.kind, TokenKind::Ident(_)) {
                optional = true;
                ty = self.expect_ident("port type")?.0;
            }
            let (name, _) = self.expect_ident("port name")?;

            let mut port = PortDecl::new(ty, name);
            port.optional = optional;

            if matches!(self.peek()?.kind, TokenKind::Eq) {
                self.next()?;
                let value = self.param_value()?;
                match value {
                    PortValue::Ref(ref text) if is_output && text == "append" => {
                        port.reducer = Reducer::Append;
                    }
                    other => port.default_value = Some(other),
                }
            }
            ports.push(port);
        }
        Ok(ports)
    }

    fn param_value(&mut self) -> Result<PortValue> {
        let tok = self.next()?;
        let value = match tok.kind {
            TokenKind::Int(n) => PortValue::Literal(Scalar::Int(n)),
            TokenKind::Float(f) => PortValue::Literal(Scalar::Float(f)),
            TokenKind::Bool(b) => PortValue::Literal(Scalar::Bool(b)),
            TokenKind::Str(s) => PortValue::Literal(Scalar::Str(s)),
            TokenKind::Duration(d) => PortValue::Literal(Scalar::Duration(d)),
            TokenKind::Ident(first) => {
                if matches!(self.peek()?.kind, TokenKind::Dot) {
                    self.next()?;
                    let (second, _) = self.expect_ident("port name after `.`")?;
                    PortValue::Ref(format!("{first}.{second}"))
                } else {
                    PortValue::Ref(first)
                }
            }
            other => {
                return Err(ParseError::syntax(
                    tok.span.line,
                    tok.span.column,
                    other.describe(),
                    &["literal", "reference"],
                ))
            }
        };
        Ok(value)
    }

    fn scalar_value(&mut self) -> Result<Scalar> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Int(n) => Ok(Scalar::Int(n)),
            TokenKind::Float(f) => Ok(Scalar::Float(f)),
            TokenKind::Bool(b) => Ok(Scalar::Bool(b)),
            TokenKind::Str(s) => Ok(Scalar::Str(s)),
            TokenKind::Duration(d) => Ok(Scalar::Duration(d)),
            // Bare identifiers in scalar position read as strings so that
            // `llm_model: gpt4` and `llm_model: "gpt4"` both work.
            TokenKind::Ident(s) => Ok(Scalar::Str(s)),
            other => Err(ParseError::syntax(
                tok.span.line,
                tok.span.column,
                other.describe(),
                &["literal"],
            )),
        }
    }

    fn node_block(&mut self) -> Result<Node> {
        let (name, name_tok) = self.expect_ident("node name")?;
        self.skip_newlines()?;
        self.expect_kind(TokenKind::LBrace, "`{`")?;

        let mut call: Option<String> = None;
        let mut node = Node::new(name.clone(), String::new());

        loop {
            self.skip_separators()?;
            let (kind, span) = {
                let tok = self.peek()?;
                (tok.kind.clone(), tok.span)
            };
            match kind {
                TokenKind::RBrace => {
                    self.next()?;
                    break;
                }
                TokenKind::Ident(ref word) => match word.as_str() {
                    "call" => {
                        self.next()?;
                        let (fn_name, _) = self.expect_ident("function name")?;
                        call = Some(fn_name);
                        self.expect_terminator()?;
                    }
                    "when" => {
                        self.next()?;
                        let expr = self.raw_expr();
                        if expr.is_empty() {
                            return Err(ParseError::invalid(
                                span.line,
                                span.column,
                                "empty `when` expression",
                            ));
                        }
                        node.when = Some(expr);
                        self.expect_terminator()?;
                    }
                    "inputs" => {
                        self.next()?;
                        node.inputs = self.param_block(false)?;
                    }
                    "outputs" => {
                        self.next()?;
                        node.outputs = self.param_block(true)?;
                    }
                    "hitl" => {
                        self.next()?;
                        node.hitl = Some(self.hitl_block()?);
                    }
                    "retry" => {
                        self.next()?;
                        node.retry = Some(self.retry_block()?);
                    }
                    "constants" => {
                        self.next()?;
                        node.constants = self.constants_block()?;
                    }
                    _ => {
                        return Err(ParseError::syntax(
                            span.line,
                            span.column,
                            kind.describe(),
                            &[
                                "call", "when", "inputs", "outputs", "hitl", "retry", "constants",
                                "`}`",
                            ],
                        ));
                    }
                },
                other => {
                    return Err(ParseError::syntax(
                        span.line,
                        span.column,
                        other.describe(),
                        &["node element", "`}`"],
                    ));
                }
            }
        }

        match call {
            Some(fn_name) => {
                node.call = fn_name;
                Ok(node)
            }
            None => Err(ParseError::invalid(
                name_tok.span.line,
                name_tok.span.column,
                format!("node `{name}` is missing a `call` statement"),
            )),
        }
    }

    fn hitl_block(&mut self) -> Result<HitlConfig> {
        self.skip_newlines()?;
        self.expect_kind(TokenKind::LBrace, "`{`")?;
        let mut config = HitlConfig::default();
        loop {
            self.skip_separators()?;
            if matches!(self.peek()?.kind, TokenKind::RBrace) {
                self.next()?;
                break;
            }
            let (key, key_tok) = self.expect_ident("hitl key")?;
            self.expect_kind(TokenKind::Colon, "`:`")?;
            let value = self.scalar_value()?;
            match key.as_str() {
                "correlation" => config.correlation = value.display_string(),
                "timeout" => config.timeout = value.display_string(),
                other => {
                    return Err(ParseError::invalid(
                        key_tok.span.line,
                        key_tok.span.column,
                        format!("unknown hitl key `{other}`"),
                    ))
                }
            }
            self.expect_terminator()?;
        }
        Ok(config)
    }

    fn retry_block(&mut self) -> Result<RetryConfig> {
        self.skip_newlines()?;
        let brace = self.expect_kind(TokenKind::LBrace, "`{`")?;
        let mut attempts: Option<u32> = None;
        let mut backoff = "1s".to_string();
        let mut policy = "fixed".to_string();
        loop {
            self.skip_separators()?;
            if matches!(self.peek()?.kind, TokenKind::RBrace) {
                self.next()?;
                break;
            }
            let (key, key_tok) = self.expect_ident("retry key")?;
            self.expect_kind(TokenKind::Colon, "`:`")?;
            let value = self.scalar_value()?;
            match key.as_str() {
                "attempts" => match value {
                    Scalar::Int(n) if n > 0 => attempts = Some(n as u32),
                    _ => {
                        return Err(ParseError::invalid(
                            key_tok.span.line,
                            key_tok.span.column,
                            "retry attempts must be a positive integer",
                        ))
                    }
                },
                "backoff" => backoff = value.display_string(),
                "policy" => policy = value.display_string(),
                other => {
                    return Err(ParseError::invalid(
                        key_tok.span.line,
                        key_tok.span.column,
                        format!("unknown retry key `{other}`"),
                    ))
                }
            }
            self.expect_terminator()?;
        }
        let attempts = attempts.ok_or_else(|| {
            ParseError::invalid(
                brace.span.line,
                brace.span.column,
                "retry block is missing `attempts`",
            )
        })?;
        Ok(RetryConfig {
            attempts,
            backoff,
            policy,
        })
    }

    fn constants_block(&mut self) -> Result<Vec<Constant>> {
        self.skip_newlines()?;
        self.expect_kind(TokenKind::LBrace, "`{`")?;
        let mut constants = Vec::new();
        loop {
            self.skip_separators()?;
            if matches!(self.peek()?.kind, TokenKind::RBrace) {
                self.next()?;
                break;
            }
            let (name, _) = self.expect_ident("constant name")?;
            self.expect_kind(TokenKind::Colon, "`:`")?;
            let value = self.scalar_value()?;
            constants.push(Constant { name, value });
            self.expect_terminator()?;
        }
        Ok(constants)
    }

    fn cycle_block(&mut self) -> Result<Cycle> {
        let (name, name_tok) = self.expect_ident("cycle name")?;
        self.skip_newlines()?;
        self.expect_kind(TokenKind::LBrace, "`{`")?;

        let mut cycle = Cycle {
            name: name.clone(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            nodes: Vec::new(),
            guard: String::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        };
        let mut guard_seen = false;

        loop {
            self.skip_separators()?;
            let (kind, span) = {
                let tok = self.peek()?;
                (tok.kind.clone(), tok.span)
            };
            match kind {
                TokenKind::RBrace => {
                    self.next()?;
                    break;
                }
                TokenKind::Ident(ref word) => match word.as_str() {
                    "inputs" => {
                        self.next()?;
                        cycle.inputs = self.param_block(false)?;
                    }
                    "outputs" => {
                        self.next()?;
                        cycle.outputs = self.param_block(true)?;
                    }
                    "node" => {
                        self.next()?;
                        cycle.nodes.push(self.node_block()?);
                    }
                    "cycle" => {
                        return Err(ParseError::invalid(
                            span.line,
                            span.column,
                            format!("nested cycles are not supported (inside `{name}`)"),
                        ));
                    }
                    "guard" => {
                        self.next()?;
                        let expr = self.raw_expr();
                        if expr.is_empty() {
                            return Err(ParseError::invalid(
                                span.line,
                                span.column,
                                "empty `guard` expression",
                            ));
                        }
                        cycle.guard = expr;
                        guard_seen = true;
                        self.expect_terminator()?;
                    }
                    "max_iterations" => {
                        self.next()?;
                        let tok = self.next()?;
                        match tok.kind {
                            TokenKind::Int(n) if n > 0 => cycle.max_iterations = n as u32,
                            other => {
                                return Err(ParseError::invalid(
                                    tok.span.line,
                                    tok.span.column,
                                    format!(
                                        "max_iterations must be a positive integer, found {}",
                                        other.describe()
                                    ),
                                ))
                            }
                        }
                        self.expect_terminator()?;
                    }
                    _ => {
                        return Err(ParseError::syntax(
                            span.line,
                            span.column,
                            kind.describe(),
                            &["inputs", "outputs", "node", "guard", "max_iterations", "`}`"],
                        ));
                    }
                },
                other => {
                    return Err(ParseError::syntax(
                        span.line,
                        span.column,
                        other.describe(),
                        &["cycle element", "`}`"],
                    ));
                }
            }
        }

        if !guard_seen {
            return Err(ParseError::invalid(
                name_tok.span.line,
                name_tok.span.column,
                format!("cycle `{name}` is missing a `guard` expression"),
            ));
        }
        Ok(cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# Deep research pipeline
workflow DeepResearch {
    metadata {
        version: "1.0"
        owner: research
    }
    inputs {
        str query
    }
    outputs {
        str final_answer = FinalAnswer.final_answer
    }

    node QueryExtender {
        call query_extender
        inputs { str query = query }
        outputs { str extended_query }
    }

    node Retrieve {
        call retrieve_from_web
        inputs { str extended_query = QueryExtender.extended_query }
        outputs { list chunks }
        retry {
            attempts: 3
            backoff: 2s
            policy: exponential
        }
    }

    node FilterChunks {
        call filter_chunks
        when Retrieve.chunks != ""
        inputs {
            list chunks = Retrieve.chunks
            optional str hint = query
        }
        outputs { list filtered_chunks }
        constants { llm_model: "gpt-4o" }
    }

    node FinalAnswer {
        call final_answer_generation
        inputs {
            str query = query
            list filtered_chunks = FilterChunks.filtered_chunks
        }
        outputs { str final_answer }
        hitl {
            correlation: answer_review
            timeout: 24h
        }
    }
}
"#;

    #[test]
    fn test_parse_sample_workflow() {
        let wf = parse_workflow(SAMPLE).unwrap();
        assert_eq!(wf.name, "DeepResearch");
        assert_eq!(wf.inputs.len(), 1);
        assert_eq!(wf.outputs.len(), 1);
        assert_eq!(wf.steps.len(), 4);

        let metadata = wf.metadata.as_ref().unwrap();
        assert_eq!(metadata.entries["version"], "1.0");
        assert_eq!(metadata.entries["owner"], "research");

        assert_eq!(
            wf.outputs[0].default_value,
            Some(PortValue::Ref("FinalAnswer.final_answer".into()))
        );

        let nodes: Vec<_> = wf.nodes().collect();
        assert_eq!(nodes[0].name, "QueryExtender");
        assert_eq!(nodes[0].call, "query_extender");
        assert_eq!(
            nodes[0].inputs[0].default_value,
            Some(PortValue::Ref("query".into()))
        );

        let retry = nodes[1].retry.as_ref().unwrap();
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.backoff, "2s");
        assert_eq!(retry.policy, "exponential");

        let filter = nodes[2];
        assert_eq!(filter.when.as_deref(), Some("Retrieve.chunks != \"\""));
        assert!(filter.inputs[1].optional);
        assert_eq!(filter.constants[0].name, "llm_model");
        assert_eq!(filter.constants[0].value, Scalar::Str("gpt-4o".into()));

        let hitl = nodes[3].hitl.as_ref().unwrap();
        assert_eq!(hitl.correlation, "answer_review");
        assert_eq!(hitl.timeout, "24h");
    }

    #[test]
    fn test_parse_cycle() {
        let src = r#"
workflow Looped {
    inputs { str query }
    outputs { list chunks = RetrieveLoop.chunks }

    cycle RetrieveLoop {
        inputs { str query = query }
        outputs { list chunks = Retrieve.chunks }
        node Retrieve {
            call retrieve_from_web
            inputs { str query = RetrieveLoop.query }
            outputs { list chunks = append }
        }
        node Check {
            call retrieve_results_check
            inputs { list chunks = Retrieve.chunks }
            outputs { bool is_enough }
        }
        guard Check.is_enough == True
        max_iterations 4
    }
}
"#;
        let wf = parse_workflow(src).unwrap();
        let cycle = wf.cycles().next().unwrap();
        assert_eq!(cycle.name, "RetrieveLoop");
        assert_eq!(cycle.guard, "Check.is_enough == True");
        assert_eq!(cycle.max_iterations, 4);
        assert_eq!(cycle.nodes.len(), 2);
        assert_eq!(cycle.nodes[0].outputs[0].reducer, Reducer::Append);
        assert_eq!(cycle.nodes[0].outputs[0].default_value, None);
        assert_eq!(cycle.nodes[1].outputs[0].reducer, Reducer::Last);
    }

    #[test]
    fn test_default_max_iterations() {
        let src = r#"
workflow W {
    inputs { str q }
    outputs { str out = Loop.out }
    cycle Loop {
        inputs { str q = q }
        outputs { str out = Inner.out }
        node Inner {
            call work
            inputs { str q = Loop.q }
            outputs { str out }
        }
        guard Inner.out != ""
    }
}
"#;
        let wf = parse_workflow(src).unwrap();
        assert_eq!(wf.cycles().next().unwrap().max_iterations, DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn test_missing_call_is_rejected() {
        let src = "workflow W {\n  node Broken {\n    inputs { str q = q }\n  }\n}";
        let err = parse_workflow(src).unwrap_err();
        match err {
            ParseError::Invalid { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("Broken"));
                assert!(message.contains("call"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_guard_is_rejected() {
        let src = r#"
workflow W {
    cycle Loop {
        inputs { str q = q }
        outputs { str out = Inner.out }
        node Inner {
            call work
            inputs { str q = Loop.q }
            outputs { str out }
        }
    }
}
"#;
        let err = parse_workflow(src).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }));
        assert!(err.to_string().contains("guard"));
    }

    #[test]
    fn test_nested_cycle_is_rejected() {
        let src = r#"
workflow W {
    cycle Outer {
        cycle Inner {
            guard x > 1
        }
        guard y > 1
    }
}
"#;
        let err = parse_workflow(src).unwrap_err();
        assert!(err.to_string().contains("nested cycles"));
    }

    #[test]
    fn test_syntax_error_carries_position_and_expectations() {
        let err = parse_workflow("workflow W {\n  bogus Thing {}\n}").unwrap_err();
        match err {
            ParseError::Syntax {
                line,
                column,
                expected,
                ..
            } => {
                assert_eq!(line, 2);
                assert_eq!(column, 3);
                assert!(expected.iter().any(|e| e == "node"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_single_line_comma_separated_ports() {
        let src = "workflow W {\n  inputs { str a, int b = 3, bool c }\n  outputs { str o }\n  node N { call f; inputs { str a = a } outputs { str o } }\n}";
        let wf = parse_workflow(src).unwrap();
        assert_eq!(wf.inputs.len(), 3);
        assert_eq!(
            wf.inputs[1].default_value,
            Some(PortValue::Literal(Scalar::Int(3)))
        );
    }

    #[test]
    fn test_semicolon_statements_on_one_line() {
        let src = "workflow W { node N { call f; when x > 1; inputs { str x = x } outputs { str y } } inputs { str x } outputs { str y = N.y } }";
        let wf = parse_workflow(src).unwrap();
        let node = wf.nodes().next().unwrap();
        assert_eq!(node.call, "f");
        assert_eq!(node.when.as_deref(), Some("x > 1"));
    }

    #[test]
    fn test_verify_reports_errors() {
        assert!(verify("workflow Ok { }").is_ok());
        assert!(verify("workflow {").is_err());
    }

    #[test]
    fn test_max_iterations_zero_rejected() {
        let src = r#"
workflow W {
    cycle Loop {
        node Inner { call f; outputs { str o } }
        guard Inner.o != ""
        max_iterations 0
    }
}
"#;
        let err = parse_workflow(src).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }
}
