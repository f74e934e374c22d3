//! Pictures composed of one expression tree per colour channel.
//!
//! 1. Generate a `Picture` with a random tree for each of the red, green and blue channels.
//! 2. Rasterize it by evaluating every channel at each pixel's coordinate.
//! 3. Mutate a single node of a single channel and rasterize again.

use crate::gp::expr::{gen, Expr, NodeIndex, Program};
use crate::gp::op::{Node, Point};
use log::debug;
use rand::Rng;
use std::fmt;

/// The number of `Function`s inserted into a freshly generated channel is drawn from
/// `0..MAX_INSERTIONS`.
pub const MAX_INSERTIONS: usize = 4;

/// The number of bytes per pixel within a rasterized buffer.
pub const BYTES_PER_PIXEL: usize = 4;

/// The expression type used for each channel.
pub type Tree = Expr<Node>;

/// One of the three colour channels of a picture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

/// A picture described by an expression tree for each colour channel.
///
/// Each tree is owned exclusively by the picture. No structure is shared between channels.
#[derive(Clone, Debug)]
pub struct Picture {
    channels: [Tree; 3],
}

impl Channel {
    /// All channels in the order in which they are stored and rasterized.
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// The position of the channel within a pixel.
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }

    /// Choose a channel uniformly at random.
    pub fn generate<R>(rng: &mut R) -> Self
    where
        R: Rng,
    {
        Channel::ALL[rng.gen_range(0..Channel::ALL.len())]
    }

    fn label(self) -> char {
        match self {
            Channel::Red => 'R',
            Channel::Green => 'G',
            Channel::Blue => 'B',
        }
    }
}

impl Picture {
    /// Generate a picture with a random, complete tree for each channel.
    ///
    /// Each channel starts from a random `Function` and has between `0` and `MAX_INSERTIONS - 1`
    /// further `Function`s inserted at random before its empty slots are filled with terminals.
    pub fn generate<R>(rng: &mut R) -> Self
    where
        R: Rng,
    {
        let red = generate_tree(rng);
        let green = generate_tree(rng);
        let blue = generate_tree(rng);
        debug!(
            "generated picture with node counts R {} G {} B {}",
            red.node_count(),
            green.node_count(),
            blue.node_count(),
        );
        Picture::from_channels(red, green, blue)
    }

    /// Create a picture from the given trees.
    ///
    /// **Panics** if any of the trees are incomplete or hold nodes detached from the root.
    pub fn from_channels(red: Tree, green: Tree, blue: Tree) -> Self {
        let channels = [red, green, blue];
        for (tree, channel) in channels.iter().zip(Channel::ALL.iter()) {
            assert!(tree.is_complete(), "the {:?} channel's tree is incomplete", channel);
            assert!(tree.is_consistent(), "the {:?} channel's tree is inconsistent", channel);
        }
        Picture { channels }
    }

    /// The tree for the given channel.
    pub fn channel(&self, channel: Channel) -> &Tree {
        &self.channels[channel.index()]
    }

    /// Mutate a single node within a randomly chosen channel.
    pub fn mutate<R>(&mut self, rng: &mut R)
    where
        R: Rng,
    {
        let channel = Channel::generate(rng);
        self.mutate_channel(rng, channel);
    }

    /// Mutate a single node chosen uniformly from the given channel's tree.
    ///
    /// Returns the index of the replacement node.
    pub fn mutate_channel<R>(&mut self, rng: &mut R, channel: Channel) -> NodeIndex
    where
        R: Rng,
    {
        let tree = &mut self.channels[channel.index()];
        let count = tree.node_count();
        let n = rng.gen_range(0..count);
        let nx = tree
            .nth_node(n)
            .expect("node index was drawn from within the node count");
        let replacement = tree.mutate(rng, nx);
        debug!(
            "mutated {:?} channel node {} of {}: {} nodes remain",
            channel,
            n,
            count,
            tree.node_count(),
        );
        debug_assert!(tree.is_consistent());
        replacement
    }

    /// Compile each channel's tree for evaluation, in channel order.
    pub fn compile(&self) -> [Program<Node>; 3] {
        [
            self.channels[0].compile(),
            self.channels[1].compile(),
            self.channels[2].compile(),
        ]
    }

    /// Evaluate the picture over a `width` x `height` grid of pixels.
    ///
    /// Returns `width * height * 4` bytes. Pixels are RGBA with full opacity and are laid out row
    /// by row from the top.
    ///
    /// **Panics** if the buffer length overflows `usize`.
    pub fn rasterize(&self, width: usize, height: usize) -> Vec<u8> {
        let mut pixels = vec![0; buffer_len(width, height)];
        let programs = self.compile();
        shade_rows(&programs, width, height, 0, &mut pixels);
        pixels
    }
}

/// The number of bytes in a rasterized `width` x `height` buffer.
///
/// **Panics** if the length overflows `usize`.
pub fn buffer_len(width: usize, height: usize) -> usize {
    width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL))
        .unwrap_or_else(|| panic!("a {} x {} pixel buffer overflows usize", width, height))
}

fn generate_tree<R>(rng: &mut R) -> Tree
where
    R: Rng,
{
    let insertions = rng.gen_range(0..MAX_INSERTIONS);
    gen::insertion_tree(rng, insertions)
}

/// Shade consecutive rows of a `width` x `height` image into `pixels`, starting at `first_row`.
///
/// `pixels` should hold a whole number of rows.
pub fn shade_rows(
    programs: &[Program<Node>; 3],
    width: usize,
    height: usize,
    first_row: usize,
    pixels: &mut [u8],
) {
    if width == 0 {
        return;
    }
    let mut stack = Vec::new();
    for (i, row) in pixels.chunks_mut(width * BYTES_PER_PIXEL).enumerate() {
        let y = coord(first_row + i, height);
        for (j, pixel) in row.chunks_mut(BYTES_PER_PIXEL).enumerate() {
            let point = Point { x: coord(j, width), y };
            for (byte, program) in pixel.iter_mut().zip(programs.iter()) {
                *byte = to_byte(program.eval(&point, &mut stack));
            }
            pixel[3] = u8::MAX;
        }
    }
}

/// Map the `i`th of `n` pixels along an axis into `[-1, 1)`.
pub fn coord(i: usize, n: usize) -> f32 {
    i as f32 / n as f32 * 2.0 - 1.0
}

/// Convert the value of a channel to an intensity.
///
/// `-1.0` maps to `0` and `1.0` to `255`, with values outside that range clamped. NaN maps to
/// `0` while infinities saturate to the nearest bound.
pub fn to_byte(value: f32) -> u8 {
    let scaled = (value + 1.0) * 127.5;
    if scaled.is_nan() {
        return 0;
    }
    scaled.max(0.0).min(255.0) as u8
}

impl fmt::Display for Picture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (tree, channel) in self.channels.iter().zip(Channel::ALL.iter()) {
            if channel.index() > 0 {
                writeln!(f)?;
            }
            write!(f, "{} {}", channel.label(), tree)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::op::{Function, Terminal};
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;
    use test_log::test;

    fn constant(value: f32) -> Tree {
        Expr::new(Node::Terminal(Terminal::Constant(value)))
    }

    #[test]
    fn to_byte_bounds() {
        assert_eq!(to_byte(-1.0), 0);
        assert_eq!(to_byte(0.0), 127);
        assert_eq!(to_byte(0.5), 191);
        assert_eq!(to_byte(1.0), 255);
        assert_eq!(to_byte(-3.0), 0);
        assert_eq!(to_byte(3.0), 255);
        assert_eq!(to_byte(std::f32::INFINITY), 255);
        assert_eq!(to_byte(std::f32::NEG_INFINITY), 0);
        assert_eq!(to_byte(std::f32::NAN), 0);
    }

    #[test]
    fn coords() {
        assert_eq!(coord(0, 4), -1.0);
        assert_eq!(coord(2, 4), 0.0);
        assert_eq!(coord(3, 4), 0.5);
    }

    #[test]
    fn rasterize_coordinates() {
        let x = Expr::new(Node::Terminal(Terminal::X));
        let y = Expr::new(Node::Terminal(Terminal::Y));
        let picture = Picture::from_channels(x, y, constant(-1.0));
        let pixels = picture.rasterize(2, 2);
        assert_eq!(
            pixels,
            vec![
                0, 0, 0, 255, //
                127, 0, 0, 255, //
                0, 127, 0, 255, //
                127, 127, 0, 255,
            ]
        );
    }

    #[test]
    fn display() {
        let mut red = Expr::new(Node::Function(Function::Negate));
        let root = red.root();
        let x = red.insert(Node::Terminal(Terminal::X));
        red.set_child(root, 0, x);
        let picture = Picture::from_channels(red, constant(0.5), Expr::new(Node::Terminal(Terminal::Y)));
        assert_eq!(picture.to_string(), "R ( Negate x )\nG 0.500000000\nB y");
    }

    #[test]
    #[should_panic]
    fn incomplete_channel() {
        let sin = Expr::new(Node::Function(Function::Sin));
        Picture::from_channels(sin, constant(0.0), constant(0.0));
    }

    #[test]
    #[should_panic(expected = "inconsistent")]
    fn detached_node_in_channel() {
        let mut red = constant(0.0);
        red.insert(Node::Terminal(Terminal::X));
        Picture::from_channels(red, constant(0.0), constant(0.0));
    }

    #[test]
    fn buffer_lengths() {
        assert_eq!(buffer_len(3, 2), 24);
        assert_eq!(buffer_len(0, std::usize::MAX), 0);
    }

    #[test]
    #[should_panic(expected = "overflows usize")]
    fn rasterize_overflowing_size() {
        Picture::from_channels(constant(0.0), constant(0.0), constant(0.0))
            .rasterize(std::usize::MAX / 2, 3);
    }

    #[test]
    fn mutate_channel_leaves_others_untouched() {
        let mut rng = XorShiftRng::seed_from_u64(9);
        let mut picture = Picture::generate(&mut rng);
        let before = picture.clone();
        for _ in 0..10 {
            picture.mutate_channel(&mut rng, Channel::Green);
        }
        assert_eq!(
            picture.channel(Channel::Red).to_string(),
            before.channel(Channel::Red).to_string()
        );
        assert_eq!(
            picture.channel(Channel::Blue).to_string(),
            before.channel(Channel::Blue).to_string()
        );
        assert!(picture.channel(Channel::Green).is_consistent());
    }

    #[test]
    fn mutate_root_replaces_channel_root() {
        let mut rng = XorShiftRng::seed_from_u64(4);
        let mut picture = Picture::from_channels(constant(0.0), constant(0.0), constant(0.0));
        let replacement = picture.mutate_channel(&mut rng, Channel::Blue);
        let blue = picture.channel(Channel::Blue);
        assert_eq!(blue.root(), replacement);
        assert_eq!(blue.parent(replacement), None);
        assert!(blue.is_complete());
    }
}
