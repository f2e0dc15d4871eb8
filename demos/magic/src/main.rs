//! A deliberately buggy target: panics once the fuzzer assembles the magic
//! marker. Handy for watching the whole crash pipeline end to end, e.g.
//!
//! ```text
//! cargo run -p fuzz-magic -- corpus --dict demos/magic/magic.dict
//! ```

fn main() {
    bytefuzz::fuzz_main(|data| {
        if data.windows(5).any(|window| window == b"MAGIC") {
            panic!("found the magic marker");
        }
    });
}
