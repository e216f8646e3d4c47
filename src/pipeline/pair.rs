//! Form pairing: consecutive rendered pages → one respondent's form.
//!
//! Every form is exactly two pages. Pages are consumed two at a time from
//! index order; an odd page count leaves one trailing page with no partner.
//! That page is dropped, but the drop is reported in [`PairingOutcome`]
//! rather than happening silently.

use crate::pipeline::store::RenderedPage;
use tracing::warn;

/// Both pages of one form. `second.index == first.index + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormImagePair {
    pub first: RenderedPage,
    pub second: RenderedPage,
}

impl FormImagePair {
    /// 1-based form number, as shown to operators.
    pub fn form_number(&self) -> usize {
        self.first.index / 2 + 1
    }
}

/// Pairs in page order plus whatever could not be paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingOutcome {
    pub pairs: Vec<FormImagePair>,
    pub discarded: Vec<RenderedPage>,
}

/// Pair `pages` two at a time, in index order.
///
/// Yields `floor(N / 2)` pairs; a final odd page goes to `discarded`.
pub fn pair_pages(mut pages: Vec<RenderedPage>) -> PairingOutcome {
    pages.sort_by_key(|p| p.index);

    let mut pairs = Vec::with_capacity(pages.len() / 2);
    let mut iter = pages.into_iter();
    let mut discarded = Vec::new();

    while let Some(first) = iter.next() {
        match iter.next() {
            Some(second) => pairs.push(FormImagePair { first, second }),
            None => discarded.push(first),
        }
    }

    for page in &discarded {
        warn!(
            "Page {} has no partner page and was dropped (odd page count)",
            page.index + 1
        );
    }

    PairingOutcome { pairs, discarded }
}
