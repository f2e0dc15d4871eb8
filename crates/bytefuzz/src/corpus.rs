//! The seed pool: loading, the seed replay phase, mutation scheduling, and
//! on-disk persistence.

use std::fmt;
use std::path::{Path, PathBuf};
use std::{fs, io};

use sha2::{Digest, Sha256};
use tracing::warn;
use walkdir::WalkDir;

use crate::dictionary::Dictionary;
use crate::mutation::{self, MutationCtx, MutationResult, Mutator};
use crate::rng::RandSource;

/// How many times one mutation round retries operators that decline before
/// giving up on the round.
const MUTATOR_RETRIES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("seed path {0} does not exist")]
    MissingSeedPath(PathBuf),
    #[error(transparent)]
    Filter(#[from] mutation::FilterError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The live pool of inputs plus everything needed to derive new ones.
///
/// The pool is non-empty from construction: a zero-length input is always
/// appended after the loaded seeds, so [`generate_input`](Self::generate_input)
/// never starves.
pub struct Corpus {
    inputs: Vec<Vec<u8>>,
    save_dir: Option<PathBuf>,
    seed_run_finished: bool,
    seed_idx: usize,
    max_input_size: usize,
    mutators: Vec<&'static dyn Mutator>,
    dict: Dictionary,
}

impl fmt::Debug for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Corpus")
            .field("inputs", &self.inputs.len())
            .field("mutators", &self.mutators.len())
            .field("save_dir", &self.save_dir)
            .finish_non_exhaustive()
    }
}

impl Corpus {
    /// Load seeds from `dirs` and set up the filtered operator catalog.
    ///
    /// The first path is created if missing and doubles as the persistence
    /// target when it is a directory; any other missing path is a
    /// configuration error. Seed files are taken from each path itself, its
    /// immediate files, and files one subdirectory down, in file-name order.
    pub fn new(
        dirs: &[PathBuf],
        max_input_size: usize,
        mutators_filter: Option<&str>,
        dict: Dictionary,
    ) -> Result<Self, CorpusError> {
        let mutators = mutation::select(mutators_filter)?;

        let mut inputs = Vec::new();
        for (idx, path) in dirs.iter().enumerate() {
            if !path.exists() {
                if idx == 0 {
                    fs::create_dir_all(path)?;
                    continue;
                }
                return Err(CorpusError::MissingSeedPath(path.clone()));
            }
            if path.is_file() {
                inputs.push(fs::read(path)?);
                continue;
            }
            for entry in WalkDir::new(path)
                .min_depth(1)
                .max_depth(2)
                .sort_by_file_name()
            {
                let entry = entry.map_err(io::Error::from)?;
                if entry.file_type().is_file() {
                    inputs.push(fs::read(entry.path())?);
                }
            }
        }

        let save_dir = dirs.first().filter(|p| p.is_dir()).map(|p| p.to_path_buf());

        // The guaranteed zero-length member, dispensed last in the seed run.
        inputs.push(Vec::new());

        Ok(Self {
            inputs,
            save_dir,
            seed_run_finished: false,
            seed_idx: 0,
            max_input_size,
            mutators,
            dict,
        })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn save_dir(&self) -> Option<&Path> {
        self.save_dir.as_deref()
    }

    /// The next input to execute: seeds verbatim first, each exactly once in
    /// insertion order, then mutated copies of uniformly chosen pool members.
    ///
    /// The returned buffer is always fresh (never aliases a pool member) and
    /// never longer than the configured maximum.
    pub fn generate_input(&mut self, rand: &mut dyn RandSource) -> Vec<u8> {
        if !self.seed_run_finished {
            let mut next = self.inputs[self.seed_idx].clone();
            self.seed_idx += 1;
            if self.seed_idx >= self.inputs.len() {
                self.seed_run_finished = true;
            }
            next.truncate(self.max_input_size);
            return next;
        }
        let buf = self.inputs[rand.below(self.inputs.len())].clone();
        self.mutate(rand, buf)
    }

    /// Apply a geometrically distributed number of mutation rounds to `buf`.
    ///
    /// Each round draws operators from the active set until one applies,
    /// bounded by [`MUTATOR_RETRIES`]; a round where every draw declines
    /// leaves the buffer as-is. The result is truncated to the maximum
    /// input size.
    pub fn mutate(&self, rand: &mut dyn RandSource, mut buf: Vec<u8>) -> Vec<u8> {
        let rounds = rand.rand_exp();
        let mut ctx = MutationCtx::new(rand, &self.dict);
        for _ in 0..rounds {
            for _ in 0..MUTATOR_RETRIES {
                let mutator = self.mutators[ctx.rand.below(self.mutators.len())];
                if mutator.mutate(&mut ctx, &mut buf) == MutationResult::Mutated {
                    break;
                }
            }
        }
        buf.truncate(self.max_input_size);
        buf
    }

    /// Add `buf` to the pool, persisting it under its content hash when a
    /// save directory is configured. Write failures are logged and ignored;
    /// losing one file must not end the session.
    pub fn put(&mut self, buf: Vec<u8>) {
        if let Some(dir) = &self.save_dir {
            let path = dir.join(hex::encode(Sha256::digest(&buf)));
            if let Err(err) = fs::write(&path, &buf) {
                warn!("failed to persist corpus input to {}: {err}", path.display());
            }
        }
        self.inputs.push(buf);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::rng::testing::ScriptedRand;
    use crate::rng::EngineRand;

    fn bare_corpus(max_input_size: usize) -> Corpus {
        Corpus::new(&[], max_input_size, None, Dictionary::default()).unwrap()
    }

    #[test]
    fn pool_is_never_empty() {
        let corpus = bare_corpus(4096);
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn seed_phase_dispenses_each_seed_once_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"first").unwrap();
        fs::write(dir.path().join("b"), b"second").unwrap();
        let mut corpus =
            Corpus::new(&[dir.path().to_path_buf()], 4096, None, Dictionary::default()).unwrap();
        let mut rand = EngineRand::with_seed(1);

        assert_eq!(corpus.generate_input(&mut rand), b"first");
        assert_eq!(corpus.generate_input(&mut rand), b"second");
        assert_eq!(corpus.generate_input(&mut rand), b"");
        assert!(corpus.seed_run_finished);
    }

    #[test]
    fn seed_files_one_subdirectory_down_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("top"), b"top").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("nested"), b"nested").unwrap();
        let corpus =
            Corpus::new(&[dir.path().to_path_buf()], 4096, None, Dictionary::default()).unwrap();
        // Two seeds plus the zero-length member.
        assert_eq!(corpus.len(), 3);
    }

    #[test]
    fn a_single_seed_file_path_is_loaded_directly() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), b"lonely").unwrap();
        let corpus =
            Corpus::new(&[file.path().to_path_buf()], 4096, None, Dictionary::default()).unwrap();
        assert_eq!(corpus.len(), 2);
        // A file as dirs[0] is not a directory, so nothing is persisted.
        assert!(corpus.save_dir().is_none());
    }

    #[test]
    fn missing_first_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("corpus");
        let corpus = Corpus::new(&[fresh.clone()], 4096, None, Dictionary::default()).unwrap();
        assert!(fresh.is_dir());
        assert_eq!(corpus.save_dir(), Some(fresh.as_path()));
    }

    #[test]
    fn missing_secondary_dir_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = Corpus::new(
            &[dir.path().to_path_buf(), missing],
            4096,
            None,
            Dictionary::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CorpusError::MissingSeedPath(_)));
    }

    #[test]
    fn empty_filter_selection_fails_fast() {
        let err = Corpus::new(&[], 4096, Some("byte !byte"), Dictionary::default()).unwrap_err();
        assert!(matches!(err, CorpusError::Filter(_)));
    }

    #[test]
    fn after_seeds_inputs_are_mutated_copies() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("seed"), b"seed-bytes").unwrap();
        let mut corpus =
            Corpus::new(&[dir.path().to_path_buf()], 4096, None, Dictionary::default()).unwrap();
        let mut rand = EngineRand::with_seed(99);
        corpus.generate_input(&mut rand);
        corpus.generate_input(&mut rand);
        assert!(corpus.seed_run_finished);

        let before: Vec<Vec<u8>> = corpus.inputs.clone();
        for _ in 0..64 {
            let input = corpus.generate_input(&mut rand);
            assert!(input.len() <= 4096);
        }
        // Generation must never mutate the pool members themselves.
        assert_eq!(corpus.inputs, before);
    }

    #[test]
    fn mutate_returns_the_copy_unchanged_when_every_round_declines() {
        // Dictionary-only operators with an empty dictionary always skip.
        let corpus = Corpus::new(&[], 4096, Some("dictionary"), Dictionary::default()).unwrap();
        // One round, then 20 operator draws that all decline.
        let mut script = vec![1usize];
        script.extend(std::iter::repeat_n(0usize, MUTATOR_RETRIES));
        let mut rand = ScriptedRand::new(&script);
        assert_eq!(corpus.mutate(&mut rand, b"stuck".to_vec()), b"stuck");
    }

    #[test]
    fn mutate_truncates_to_the_maximum_size() {
        let corpus = bare_corpus(4);
        // Zero rounds: the copy passes straight through to truncation.
        let mut rand = ScriptedRand::new(&[0]);
        assert_eq!(corpus.mutate(&mut rand, b"123456789".to_vec()), b"1234");
    }

    #[test]
    fn zero_max_size_means_every_input_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("seed"), b"not empty").unwrap();
        let mut corpus =
            Corpus::new(&[dir.path().to_path_buf()], 0, None, Dictionary::default()).unwrap();
        let mut rand = EngineRand::with_seed(3);
        for _ in 0..16 {
            assert!(corpus.generate_input(&mut rand).is_empty());
        }
    }

    #[test]
    fn put_persists_under_the_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mut corpus =
            Corpus::new(&[dir.path().to_path_buf()], 4096, None, Dictionary::default()).unwrap();
        corpus.put(b"hello".to_vec());
        corpus.put(b"hello".to_vec());

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "identical content must share one file");
        let name = entries[0].as_ref().unwrap().file_name();
        assert_eq!(
            name.to_str().unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn previous_sessions_corpus_reloads_as_seeds() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut corpus =
                Corpus::new(&[dir.path().to_path_buf()], 4096, None, Dictionary::default())
                    .unwrap();
            corpus.put(b"kept-one".to_vec());
            corpus.put(b"kept-two".to_vec());
        }
        let corpus =
            Corpus::new(&[dir.path().to_path_buf()], 4096, None, Dictionary::default()).unwrap();
        // Two reloaded seeds plus the zero-length member.
        assert_eq!(corpus.len(), 3);
    }
}
