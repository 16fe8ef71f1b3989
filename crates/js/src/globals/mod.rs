//! Predefined globals and the behaviour attached to them.

mod registry;

pub use registry::{Entity, EntityId, Registry};

use appvalidator_report::MessageKind;

use crate::ast::NodeId;
use crate::traverser::Traverser;
use crate::value::{Literal, Value};

/// Behaviour attached to an entity. Hooks receive the callee and the raw
/// argument nodes; they evaluate arguments through the traverser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// `eval` and `Function`
    CspScript,
    /// `setTimeout` and `setInterval`
    Timer,
    GetUserMedia,
    XhrOpen,
    XhrNew,
    StringCtor,
    ArrayCtor,
    NumberCtor,
    BooleanCtor,
    Math(MathFn),
    MathLog,
    MathRound,
    MathRandom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Abs,
    Acos,
    Asin,
    Atan,
    Atan2,
    Ceil,
    Cos,
    Exp,
    Floor,
    Max,
    Min,
    Pow,
    Sin,
    Sqrt,
    Tan,
}

const GUM_FEATURES: [(&str, &str); 3] = [("video", "CAMERA"), ("picture", "CAMERA"), ("audio", "MIC")];

impl Hook {
    /// Runs the hook. `None` lets the caller fall back to its default
    /// result.
    pub(crate) fn call(self, t: &mut Traverser<'_>, callee: &Value, args: &[NodeId]) -> Option<Value> {
        match self {
            Hook::CspScript => {
                t.warn_csp("script");
                None
            }
            Hook::Timer => {
                if let Some(first) = args.first() {
                    let callback = t.traverse(*first);
                    if !t.heap.is_callable(&callback) {
                        t.warn_csp("set*");
                    }
                }
                None
            }
            Hook::GetUserMedia => {
                get_user_media(t, args);
                None
            }
            Hook::XhrOpen => {
                if args.len() >= 3 {
                    let is_async = t.traverse(args[2]);
                    if !t.heap.truthy(&is_async) {
                        t.report(
                            MessageKind::Warning,
                            &["javascript", "xhr", "sync"],
                            "Synchronous XHR should not be used",
                            "Synchronous HTTP requests can cause serious UI performance problems, \
                             especially to users with slow network connections.",
                        );
                    }
                }
                Some(callee.clone())
            }
            Hook::XhrNew => {
                if let Some(first) = args.first() {
                    let options = t.traverse(*first);
                    if t.has_property(&options, "mozSystem") {
                        let system = t.get_property(&options, "mozSystem", false);
                        if t.heap.truthy(&system) {
                            t.log_feature("SYSTEMXHR");
                        }
                    }
                }
                None
            }
            Hook::StringCtor => Some(match args.first() {
                None => Value::Lit(Literal::string("")),
                Some(first) => {
                    let value = t.traverse(*first);
                    Value::Lit(Literal::string(t.heap.as_str(&value)))
                }
            }),
            Hook::ArrayCtor => {
                let elements = args.iter().map(|arg| Some(t.traverse(*arg))).collect();
                Some(t.heap.array(elements))
            }
            Hook::NumberCtor => Some(match args.first() {
                None => Value::Lit(Literal::Number(0.0)),
                Some(first) => {
                    let value = t.traverse(*first);
                    let literal = t.heap.literal_value(&value);
                    if literal.is_nullish() || !literal.is_numeric() || t.heap.is_opaque(&value) {
                        t.nan()
                    } else {
                        Value::Lit(Literal::Number(literal.as_num()))
                    }
                }
            }),
            Hook::BooleanCtor => Some(match args.first() {
                None => Value::Lit(Literal::Bool(false)),
                Some(first) => {
                    let value = t.traverse(*first);
                    Value::Lit(Literal::Bool(t.heap.truthy(&value)))
                }
            }),
            Hook::Math(function) => {
                let params: Vec<f64> = args
                    .iter()
                    .map(|arg| {
                        let value = t.traverse(*arg);
                        t.heap.as_num(&value)
                    })
                    .collect();
                match function.apply(&params) {
                    Some(result) => Some(Value::Lit(Literal::Number(result))),
                    None => Some(t.opaque()),
                }
            }
            Hook::MathLog => {
                let Some(first) = args.first() else {
                    return Some(Value::Lit(Literal::Number(0.0)));
                };
                let value = t.traverse(*first);
                let n = t.heap.as_num(&value);
                if n == 0.0 {
                    Some(Value::Lit(Literal::Number(f64::NEG_INFINITY)))
                } else if n < 0.0 || n.is_nan() {
                    Some(t.opaque())
                } else {
                    Some(Value::Lit(Literal::Number(n.ln())))
                }
            }
            Hook::MathRound => {
                let Some(first) = args.first() else {
                    return Some(Value::Lit(Literal::Number(0.0)));
                };
                let value = t.traverse(*first);
                let n = t.heap.as_num(&value);
                if n.is_infinite() {
                    return Some(value);
                }
                Some(Value::Lit(Literal::Number((n + 0.5).floor())))
            }
            Hook::MathRandom => Some(Value::Lit(Literal::Number(0.5))),
        }
    }
}

impl MathFn {
    /// Evaluates the function. Results we cannot represent (NaN, or an
    /// overflow from finite input) come back as `None`.
    fn apply(self, params: &[f64]) -> Option<f64> {
        let arg = |i: usize, default: f64| params.get(i).copied().unwrap_or(default);
        let x = arg(0, 0.0);
        let result = match self {
            MathFn::Abs => x.abs(),
            MathFn::Acos => x.acos(),
            MathFn::Asin => x.asin(),
            MathFn::Atan => x.atan(),
            MathFn::Atan2 => x.atan2(arg(1, 0.0)),
            MathFn::Ceil => x.ceil(),
            MathFn::Cos => x.cos(),
            MathFn::Exp => x.exp(),
            MathFn::Floor => x.floor(),
            MathFn::Max => params.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            MathFn::Min => params.iter().copied().fold(f64::INFINITY, f64::min),
            MathFn::Pow => x.powf(arg(1, 0.0)),
            MathFn::Sin => x.sin(),
            MathFn::Sqrt => arg(0, 1.0).sqrt(),
            MathFn::Tan => x.tan(),
        };

        let finite_input = params.iter().all(|p| p.is_finite());
        let variadic = matches!(self, MathFn::Max | MathFn::Min);
        if result.is_nan() || (result.is_infinite() && finite_input && !variadic) {
            return None;
        }
        Some(result)
    }
}

fn get_user_media(t: &mut Traverser<'_>, args: &[NodeId]) {
    let Some(first) = args.first() else { return };
    let options = t.traverse(*first);

    for (key, tag) in GUM_FEATURES {
        if t.has_property(&options, key) {
            let flag = t.get_property(&options, key, false);
            if t.heap.literal_value(&flag) == Literal::Bool(true) {
                t.log_feature(tag);
            }
        }
    }

    if !t.has_property(&options, "video") {
        return;
    }
    let video = t.get_property(&options, "video", false);
    if !t.has_property(&video, "mandatory") {
        return;
    }
    let mandatory = t.get_property(&video, "mandatory", false);
    let source = t.get_property(&mandatory, "chromeMediaSource", false);
    if t.heap.literal_value(&source) == Literal::string("screen") {
        t.log_feature("SCREEN_CAPTURE");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_functions() {
        assert_eq!(MathFn::Abs.apply(&[-5.0]), Some(5.0));
        assert_eq!(MathFn::Ceil.apply(&[-0.0000001]), Some(-0.0));
        assert_eq!(MathFn::Floor.apply(&[-1.1]), Some(-2.0));
        assert_eq!(MathFn::Pow.apply(&[2.0, 32.0]), Some(4294967296.0));
        assert_eq!(MathFn::Pow.apply(&[1.0000001, f64::INFINITY]), Some(f64::INFINITY));
        assert_eq!(MathFn::Sqrt.apply(&[]), Some(1.0));
        assert_eq!(MathFn::Atan2.apply(&[0.0, 0.0]), Some(0.0));
        assert_eq!(MathFn::Max.apply(&[1.0, 7.0, 3.0]), Some(7.0));
    }

    #[test]
    fn test_unrepresentable_results() {
        assert_eq!(MathFn::Exp.apply(&[1000.0]), None);
        assert_eq!(MathFn::Acos.apply(&[2.0]), None);
        assert_eq!(MathFn::Exp.apply(&[f64::INFINITY]), Some(f64::INFINITY));
    }
}
