// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod accounts;
pub mod cash_flows;
pub mod categories;
pub mod portfolio;
pub mod importer;
pub mod payees;
pub mod taxes;
