// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Year-scoped tax entries and the bracketed return computation.

pub mod brackets;
pub mod entries;
pub mod returns;

pub use brackets::TaxYear;
pub use entries::NewTaxEntry;
pub use returns::NewTaxReturn;
