//! The node set used to grow pictures.
//!
//! Every node evaluates to an `f32` in terms of a `Point` within the image. Domain errors (e.g.
//! division by zero or the log of a negative number) are not guarded and produce infinities or
//! NaN as per IEEE-754.

use crate::gp::expr::gen::{self, Arity};
use crate::gp::expr::Evaluate;
use rand::Rng;
use std::fmt;

/// The number of decimal places used when displaying a `Terminal::Constant`.
pub const CONSTANT_PRECISION: usize = 9;

/// Out of `MUTATION_ODDS` mutations, the number that produce a `Function` rather than a
/// `Terminal`.
pub const MUTATION_FUNCTION_ODDS: u32 = 17;

/// See `MUTATION_FUNCTION_ODDS`.
pub const MUTATION_ODDS: u32 = 19;

/// The coordinate at which an expression is evaluated.
///
/// Both axes span `[-1, 1)` across the image.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// The possible leaves of the tree.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Terminal {
    /// The `x` coordinate of the point.
    X,
    /// The `y` coordinate of the point.
    Y,
    /// A value within `[-1, 1)`, fixed when generated.
    Constant(f32),
}

/// Functions that can be composed together within a channel's tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Plus,
    Minus,
    Mult,
    Div,
    Atan,
    Atan2,
    Ceil,
    Floor,
    /// Clamp the first input to within the magnitude of the second.
    Clip,
    Cos,
    Sin,
    /// Interpolate from the first to the second input by the third.
    Lerp,
    Log2,
    Abs,
    Negate,
    Square,
    /// Wrap the input around into the range `[-1, 1)`.
    Wrap,
}

/// The node type used within the expression tree.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Node {
    Terminal(Terminal),
    Function(Function),
}

impl Function {
    /// All functions in the order in which they are indexed during generation.
    pub const ALL: [Function; 17] = [
        Function::Plus,
        Function::Minus,
        Function::Mult,
        Function::Div,
        Function::Atan,
        Function::Atan2,
        Function::Ceil,
        Function::Floor,
        Function::Clip,
        Function::Cos,
        Function::Sin,
        Function::Lerp,
        Function::Log2,
        Function::Abs,
        Function::Negate,
        Function::Square,
        Function::Wrap,
    ];

    /// The symbol used when displaying the function.
    pub fn symbol(&self) -> &'static str {
        match *self {
            Function::Plus => "+",
            Function::Minus => "-",
            Function::Mult => "*",
            Function::Div => "/",
            Function::Atan => "Atan",
            Function::Atan2 => "Atan2",
            Function::Ceil => "Ceil",
            Function::Floor => "Floor",
            Function::Clip => "Clip",
            Function::Cos => "Cos",
            Function::Sin => "Sin",
            Function::Lerp => "Lerp",
            Function::Log2 => "Log2",
            Function::Abs => "Abs",
            Function::Negate => "Negate",
            Function::Square => "Square",
            Function::Wrap => "Wrap",
        }
    }

    /// Apply the function to its inputs.
    ///
    /// `inputs` must contain exactly `arity` values.
    pub fn apply(&self, inputs: &[f32]) -> f32 {
        match *self {
            Function::Plus => inputs[0] + inputs[1],
            Function::Minus => inputs[0] - inputs[1],
            Function::Mult => inputs[0] * inputs[1],
            Function::Div => inputs[0] / inputs[1],
            Function::Atan => inputs[0].atan(),
            Function::Atan2 => inputs[0].atan2(inputs[1]),
            Function::Ceil => inputs[0].ceil(),
            Function::Floor => inputs[0].floor(),
            Function::Clip => {
                let value = inputs[0];
                let max = inputs[1].abs();
                if value > max {
                    max
                } else if value < -max {
                    -max
                } else {
                    value
                }
            }
            Function::Cos => inputs[0].cos(),
            Function::Sin => inputs[0].sin(),
            Function::Lerp => {
                let (a, b, pct) = (inputs[0], inputs[1], inputs[2]);
                a + pct * (b - a)
            }
            Function::Log2 => inputs[0].log2(),
            Function::Abs => inputs[0].abs(),
            Function::Negate => -inputs[0],
            Function::Square => inputs[0] * inputs[0],
            Function::Wrap => {
                let t = (inputs[0] + 1.0) / 2.0;
                -1.0 + 2.0 * (t - t.floor())
            }
        }
    }
}

impl Terminal {
    /// The value of the terminal at the given point.
    pub fn value(&self, point: &Point) -> f32 {
        match *self {
            Terminal::X => point.x,
            Terminal::Y => point.y,
            Terminal::Constant(value) => value,
        }
    }
}

// Arity impls.

impl gen::Arity for Function {
    fn arity(&self) -> u32 {
        match *self {
            Function::Lerp => 3,
            Function::Plus
            | Function::Minus
            | Function::Mult
            | Function::Div
            | Function::Atan2
            | Function::Clip => 2,
            Function::Atan
            | Function::Ceil
            | Function::Floor
            | Function::Cos
            | Function::Sin
            | Function::Log2
            | Function::Abs
            | Function::Negate
            | Function::Square
            | Function::Wrap => 1,
        }
    }
}

impl gen::Arity for Node {
    fn arity(&self) -> u32 {
        match *self {
            Node::Function(ref f) => f.arity(),
            Node::Terminal(_) => 0,
        }
    }
}

// Function impls.

impl gen::Function for Function {
    fn generate<R>(rng: &mut R) -> Self
    where
        R: Rng,
    {
        Function::ALL[rng.gen_range(0..Function::ALL.len())]
    }
}

impl gen::Function for Node {
    fn generate<R>(rng: &mut R) -> Self
    where
        R: Rng,
    {
        Node::Function(gen::Function::generate(rng))
    }
}

// Terminal impls.

impl gen::Terminal for Terminal {
    fn generate<R>(rng: &mut R) -> Self
    where
        R: Rng,
    {
        match rng.gen_range(0..3) {
            0 => Terminal::X,
            1 => Terminal::Y,
            2 => Terminal::Constant(rng.gen_range(-1.0..1.0)),
            _ => unreachable!(),
        }
    }
}

impl gen::Terminal for Node {
    fn generate<R>(rng: &mut R) -> Self
    where
        R: Rng,
    {
        Node::Terminal(gen::Terminal::generate(rng))
    }
}

// Mutation impl.

impl gen::Mutation for Node {
    fn generate<R>(rng: &mut R) -> Self
    where
        R: Rng,
    {
        if rng.gen_range(0..MUTATION_ODDS) < MUTATION_FUNCTION_ODDS {
            <Node as gen::Function>::generate(rng)
        } else {
            <Node as gen::Terminal>::generate(rng)
        }
    }
}

// Evaluate impl.

impl Evaluate<Point> for Node {
    type Value = f32;
    fn evaluate(&self, inputs: &[f32], point: &Point) -> f32 {
        match *self {
            Node::Terminal(ref t) => t.value(point),
            Node::Function(ref f) => f.apply(inputs),
        }
    }
}

// Display impls.

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Terminal::X => f.write_str("x"),
            Terminal::Y => f.write_str("y"),
            Terminal::Constant(value) => write!(f, "{:.*}", CONSTANT_PRECISION, value),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Node::Terminal(ref t) => fmt::Display::fmt(t, f),
            Node::Function(ref func) => fmt::Display::fmt(func, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnv::FnvHashMap;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn apply(f: Function, inputs: &[f32]) -> f32 {
        assert_eq!(inputs.len(), f.arity() as usize);
        f.apply(inputs)
    }

    #[test]
    fn arithmetic() {
        assert_eq!(apply(Function::Plus, &[1.5, 2.0]), 3.5);
        assert_eq!(apply(Function::Minus, &[1.5, 2.0]), -0.5);
        assert_eq!(apply(Function::Mult, &[1.5, 2.0]), 3.0);
        assert_eq!(apply(Function::Div, &[1.5, 2.0]), 0.75);
        assert_eq!(apply(Function::Negate, &[0.25]), -0.25);
        assert_eq!(apply(Function::Square, &[-3.0]), 9.0);
        assert_eq!(apply(Function::Abs, &[-3.0]), 3.0);
        assert_eq!(apply(Function::Ceil, &[-0.5]), 0.0);
        assert_eq!(apply(Function::Floor, &[-0.5]), -1.0);
        assert_eq!(apply(Function::Log2, &[8.0]), 3.0);
        assert!((apply(Function::Atan2, &[1.0, 1.0]) - std::f32::consts::FRAC_PI_4).abs() < 1e-6);
    }

    #[test]
    fn lerp() {
        assert_eq!(apply(Function::Lerp, &[-1.0, 1.0, 0.0]), -1.0);
        assert_eq!(apply(Function::Lerp, &[-1.0, 1.0, 0.5]), 0.0);
        assert_eq!(apply(Function::Lerp, &[-1.0, 1.0, 1.0]), 1.0);
    }

    #[test]
    fn clip() {
        assert_eq!(apply(Function::Clip, &[0.75, -0.5]), 0.5);
        assert_eq!(apply(Function::Clip, &[-0.75, 0.5]), -0.5);
        assert_eq!(apply(Function::Clip, &[0.25, 0.5]), 0.25);
        assert!(apply(Function::Clip, &[std::f32::NAN, 0.5]).is_nan());
    }

    #[test]
    fn wrap() {
        assert_eq!(apply(Function::Wrap, &[0.5]), 0.5);
        assert_eq!(apply(Function::Wrap, &[1.0]), -1.0);
        assert_eq!(apply(Function::Wrap, &[1.5]), -0.5);
        assert_eq!(apply(Function::Wrap, &[-1.5]), 0.5);
        for &v in &[-7.3, -2.0, 0.0, 3.9, 100.25] {
            let w = apply(Function::Wrap, &[v]);
            assert!(w >= -1.0 && w < 1.0, "wrap({}) = {}", v, w);
        }
    }

    #[test]
    fn domain_errors_are_values() {
        assert_eq!(apply(Function::Div, &[1.0, 0.0]), std::f32::INFINITY);
        assert!(apply(Function::Div, &[0.0, 0.0]).is_nan());
        assert!(apply(Function::Log2, &[-1.0]).is_nan());
        assert_eq!(apply(Function::Log2, &[0.0]), std::f32::NEG_INFINITY);
    }

    #[test]
    fn terminals() {
        let point = Point { x: 0.25, y: -0.75 };
        let node = |t| Node::Terminal(t);
        assert_eq!(node(Terminal::X).evaluate(&[], &point), 0.25);
        assert_eq!(node(Terminal::Y).evaluate(&[], &point), -0.75);
        assert_eq!(node(Terminal::Constant(0.125)).evaluate(&[], &point), 0.125);
        assert_eq!(node(Terminal::X).arity(), 0);
    }

    #[test]
    fn display() {
        assert_eq!(Node::Function(Function::Plus).to_string(), "+");
        assert_eq!(Node::Function(Function::Atan2).to_string(), "Atan2");
        assert_eq!(Node::Terminal(Terminal::X).to_string(), "x");
        assert_eq!(Node::Terminal(Terminal::Y).to_string(), "y");
        assert_eq!(Node::Terminal(Terminal::Constant(-0.25)).to_string(), "-0.250000000");
    }

    #[test]
    fn generated_distributions() {
        let mut rng = XorShiftRng::seed_from_u64(1);
        let mut functions = FnvHashMap::default();
        for _ in 0..17_000 {
            let f: Function = gen::Function::generate(&mut rng);
            *functions.entry(f).or_insert(0) += 1;
        }
        assert_eq!(functions.len(), Function::ALL.len());
        assert!(functions.values().all(|&n| n > 700 && n < 1300));

        let (mut xs, mut ys, mut constants) = (0, 0, 0);
        for _ in 0..3_000 {
            let terminal: Terminal = gen::Terminal::generate(&mut rng);
            match terminal {
                Terminal::X => xs += 1,
                Terminal::Y => ys += 1,
                Terminal::Constant(v) => {
                    assert!(v >= -1.0 && v < 1.0);
                    constants += 1;
                }
            }
        }
        assert!(xs > 800 && ys > 800 && constants > 800);
    }

    #[test]
    fn mutation_mostly_produces_functions() {
        let mut rng = XorShiftRng::seed_from_u64(2);
        let draws = 19_000;
        let functions = (0..draws)
            .map(|_| <Node as gen::Mutation>::generate(&mut rng))
            .filter(|node| node.arity() > 0)
            .count();
        // Expect about 17_000.
        assert!(functions > 16_500 && functions < 17_500, "{}", functions);
    }
}
