use crate::error::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Expr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

impl Template {
    /// The expression, when the whole template is exactly one `{{expr}}`.
    pub fn single_expr(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Expr(e)] => Some(e.as_str()),
            _ => None,
        }
    }

    pub fn has_expressions(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Expr(_)))
    }
}

pub fn contains_placeholder(input: &str) -> bool {
    input
        .find("{{")
        .is_some_and(|start| input[start + 2..].contains("}}"))
}

/// Splits `input` into literal text and `{{expr}}` placeholders.
pub fn parse_template(input: &str) -> Result<Template, TemplateError> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        buf.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(TemplateError::UnclosedPlaceholder(input.to_string()));
        };
        let inner = after[..end].trim();
        if inner.is_empty() {
            // `{{}}` carries no expression; keep it as text.
            buf.push_str("{{}}");
        } else {
            if !buf.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut buf)));
            }
            segments.push(Segment::Expr(inner.to_string()));
        }
        rest = &after[end + 2..];
    }
    buf.push_str(rest);

    if !buf.is_empty() {
        segments.push(Segment::Literal(buf));
    }

    Ok(Template { segments })
}

/// Expressions referenced by `input`, in order of appearance.
pub fn extract_expressions(input: &str) -> Vec<String> {
    parse_template(input)
        .map(|t| {
            t.segments
                .into_iter()
                .filter_map(|s| match s {
                    Segment::Expr(e) => Some(e),
                    Segment::Literal(_) => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_literals_and_expressions() {
        let t = parse_template("{{base}}/item/{{ id }}").unwrap();
        assert_eq!(
            t.segments,
            vec![
                Segment::Expr("base".into()),
                Segment::Literal("/item/".into()),
                Segment::Expr("id".into()),
            ]
        );
        assert!(t.single_expr().is_none());
    }

    #[test]
    fn single_expression_is_detected() {
        let t = parse_template("{{ count }}").unwrap();
        assert_eq!(t.single_expr(), Some("count"));
    }

    #[test]
    fn json_braces_are_literal() {
        let t = parse_template(r#"{"a": {"b": 1}}"#).unwrap();
        assert!(!t.has_expressions());
    }

    #[test]
    fn unclosed_placeholder_is_an_error() {
        assert!(matches!(
            parse_template("hello {{name"),
            Err(TemplateError::UnclosedPlaceholder(_))
        ));
    }
}
