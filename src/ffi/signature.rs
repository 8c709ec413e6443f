use crate::config::types::NativeLibraryError;
use std::fmt;

/// Primitive type in a call signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NativeType {
    Void,
    Sint8,
    Uint8,
    Sint16,
    Uint16,
    Sint32,
    Uint32,
    Sint64,
    Uint64,
    Float,
    Double,
    Pointer,
    String,
}

impl NativeType {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "VOID" => NativeType::Void,
            "SINT8" => NativeType::Sint8,
            "UINT8" => NativeType::Uint8,
            "SINT16" => NativeType::Sint16,
            "UINT16" => NativeType::Uint16,
            "SINT32" => NativeType::Sint32,
            "UINT32" => NativeType::Uint32,
            "SINT64" => NativeType::Sint64,
            "UINT64" => NativeType::Uint64,
            "FLOAT" => NativeType::Float,
            "DOUBLE" => NativeType::Double,
            "POINTER" => NativeType::Pointer,
            "STRING" => NativeType::String,
            _ => return None,
        })
    }

    /// Passed in a general purpose register.
    pub fn is_integer_class(self) -> bool {
        !matches!(self, NativeType::Void | NativeType::Float | NativeType::Double)
    }

    pub fn name(self) -> &'static str {
        match self {
            NativeType::Void => "VOID",
            NativeType::Sint8 => "SINT8",
            NativeType::Uint8 => "UINT8",
            NativeType::Sint16 => "SINT16",
            NativeType::Uint16 => "UINT16",
            NativeType::Sint32 => "SINT32",
            NativeType::Uint32 => "UINT32",
            NativeType::Sint64 => "SINT64",
            NativeType::Uint64 => "UINT64",
            NativeType::Float => "FLOAT",
            NativeType::Double => "DOUBLE",
            NativeType::Pointer => "POINTER",
            NativeType::String => "STRING",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    Scalar(NativeType),
    /// `[T]`: array passed by reference.
    Array(NativeType),
}

impl ParamType {
    pub fn is_integer_class(self) -> bool {
        match self {
            ParamType::Scalar(t) => t.is_integer_class(),
            ParamType::Array(_) => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Scalar(t) => f.write_str(t.name()),
            ParamType::Array(t) => write!(f, "[{}]", t.name()),
        }
    }
}

/// Parsed form of `"(SINT32, [UINT8], UINT64): SINT64"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    params: Vec<ParamType>,
    ret: NativeType,
}

impl Signature {
    pub fn parse(text: &str) -> Result<Self, NativeLibraryError> {
        let bad = |reason: &str| NativeLibraryError::BadSignature {
            signature: text.to_string(),
            reason: reason.to_string(),
        };

        let text_trimmed = text.trim();
        let rest = text_trimmed
            .strip_prefix('(')
            .ok_or_else(|| bad("expected '('"))?;
        let close = rest.find(')').ok_or_else(|| bad("expected ')'"))?;
        let (params_text, tail) = rest.split_at(close);
        let ret_text = tail[1..]
            .trim()
            .strip_prefix(':')
            .ok_or_else(|| bad("expected ':' before return type"))?
            .trim();

        let ret = NativeType::parse(ret_text)
            .ok_or_else(|| bad(&format!("unknown return type '{}'", ret_text)))?;

        let mut params = Vec::new();
        if !params_text.trim().is_empty() {
            for token in params_text.split(',') {
                let token = token.trim();
                let param = match token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                    Some(inner) => ParamType::Array(
                        NativeType::parse(inner.trim())
                            .ok_or_else(|| bad(&format!("unknown element type '{}'", inner)))?,
                    ),
                    None => {
                        let t = NativeType::parse(token)
                            .ok_or_else(|| bad(&format!("unknown parameter type '{}'", token)))?;
                        if t == NativeType::Void {
                            return Err(bad("VOID is not a parameter type"));
                        }
                        ParamType::Scalar(t)
                    }
                };
                params.push(param);
            }
        }

        Ok(Self { params, ret })
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn ret(&self) -> NativeType {
        self.ret
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, "): {}", self.ret.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_array() {
        let sig = Signature::parse("(UINT64, [UINT8], UINT32): UINT64").unwrap();
        assert_eq!(
            sig.params(),
            &[
                ParamType::Scalar(NativeType::Uint64),
                ParamType::Array(NativeType::Uint8),
                ParamType::Scalar(NativeType::Uint32)
            ]
        );
        assert_eq!(sig.ret(), NativeType::Uint64);
        assert_eq!(sig.to_string(), "(UINT64, [UINT8], UINT32): UINT64");
    }

    #[test]
    fn test_parse_nullary() {
        let sig = Signature::parse("(): STRING").unwrap();
        assert_eq!(sig.arity(), 0);
        assert_eq!(sig.ret(), NativeType::String);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Signature::parse("SINT32): VOID").is_err());
        assert!(Signature::parse("(SINT32) VOID").is_err());
        assert!(Signature::parse("(SINT33): VOID").is_err());
        assert!(Signature::parse("(VOID): VOID").is_err());
        assert!(Signature::parse("([BOGUS]): VOID").is_err());
    }
}
