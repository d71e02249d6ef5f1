//! Resolution pipeline.
//!
//! Turns the raw registration set into the finalized, condition-satisfied
//! bean set, in order: group generators fan out extra definitions from the
//! property source; configuration beans expand their surviving factory
//! methods into child beans; mocks displace their matched targets; every
//! bean's conditions are evaluated (recursively resolving beans probed by
//! bean-lookup conditions); duplicate identities fail fast. Beans leave this
//! stage `Resolved` or `Deleted`.

use crate::bean::{BeanMock, BeanStatus, Selector};
use crate::cond::{on_bean, BeanLookup, CondContext};
use crate::container::{BeanRecord, GroupFn};
use crate::error::{BeanError, BeanResult};
use crate::props::Properties;

const DEFAULT_METHOD_PATTERN: &str = "new_*";

pub(crate) fn resolve_all(
    records: &mut Vec<BeanRecord>,
    groups: &[GroupFn],
    mocks: Vec<BeanMock>,
    props: &dyn Properties,
) -> BeanResult<()> {
    // 1. Config-driven fan-out.
    for group in groups {
        for def in group(props)? {
            records.push(BeanRecord::new(def));
        }
    }

    // 2. Configuration beans expand into child beans, unless a mock aims
    // directly at the scanner.
    expand_configurations(records, &mocks)?;

    // 3. Mocks displace their targets before any condition runs.
    apply_mocks(records, mocks)?;

    // 4. Condition evaluation, re-entrant through bean-lookup probes.
    let mut pass = ResolvePass { records, props };
    for i in 0..pass.records.len() {
        pass.resolve_bean(i)?;
    }

    // 5. Duplicate identity check over the surviving set.
    check_duplicates(pass.records)
}

fn expand_configurations(records: &mut Vec<BeanRecord>, mocks: &[BeanMock]) -> BeanResult<()> {
    let mut children = Vec::new();
    for i in 0..records.len() {
        let Some(scan) = records[i].def.configuration.clone() else {
            continue;
        };
        let suppressed = mocks.iter().any(|m| records[i].matches(&m.selector));
        let methods = std::mem::take(&mut records[i].def.methods);
        if suppressed {
            continue;
        }

        let parent = Selector {
            type_id: records[i].def.type_id,
            type_name: records[i].def.type_name,
            name: Some(records[i].def.name.clone()),
        };
        let includes: Vec<&str> = if scan.includes.is_empty() {
            vec![DEFAULT_METHOD_PATTERN]
        } else {
            scan.includes.iter().map(|s| s.as_str()).collect()
        };

        for method in methods {
            let included = includes.iter().any(|p| pattern_match(p, &method.name));
            let excluded = scan.excludes.iter().any(|p| pattern_match(p, &method.name));
            if !included || excluded {
                continue;
            }
            let mut def = method.def;
            def.conditions.push(on_bean(parent.clone()));
            children.push(BeanRecord::new(def));
        }
    }
    records.extend(children);
    Ok(())
}

fn apply_mocks(records: &mut [BeanRecord], mocks: Vec<BeanMock>) -> BeanResult<()> {
    for mock in mocks {
        let matches: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(&mock.selector))
            .map(|(i, _)| i)
            .collect();
        let target = match matches.len() {
            0 => return Err(BeanError::MockTargetNotFound(mock.selector.to_string())),
            1 => matches[0],
            _ => {
                return Err(BeanError::DuplicateMock(format!(
                    "{} matches {} beans",
                    mock.selector,
                    matches.len()
                )))
            }
        };

        // The mock must cover every capability the bean advertises beyond
        // its own concrete type.
        for export in &records[target].def.exports {
            if export.type_id == records[target].def.type_id {
                continue;
            }
            let covered = mock
                .object
                .exports
                .iter()
                .any(|m| m.type_id == export.type_id);
            if !covered {
                return Err(BeanError::UnimplementedInterface(format!(
                    "mock {} does not implement {} exported by {}",
                    mock.object.type_name,
                    export.type_name,
                    records[target].def.describe()
                )));
            }
        }
        records[target].mock = Some(mock.object);
    }
    Ok(())
}

struct ResolvePass<'a> {
    records: &'a mut Vec<BeanRecord>,
    props: &'a dyn Properties,
}

impl ResolvePass<'_> {
    /// Evaluates a bean's conditions at most once. A bean probed while its
    /// own evaluation is in progress stays `Resolving` and reports as
    /// absent; cyclic conditions are a configuration problem distinct from
    /// cyclic dependencies and must not recurse forever.
    fn resolve_bean(&mut self, index: usize) -> BeanResult<()> {
        match self.records[index].status {
            BeanStatus::Default => {}
            _ => return Ok(()),
        }
        self.records[index].status = BeanStatus::Resolving;

        let conditions = self.records[index].def.conditions.clone();
        let props = self.props;
        for cond in conditions {
            let matched = {
                let mut ctx = CondContext {
                    props,
                    lookup: self,
                };
                cond.matches(&mut ctx)
            }
            .map_err(|e| {
                BeanError::Condition(format!("{}: {}", self.records[index].def.describe(), e))
            })?;
            if !matched {
                self.records[index].status = BeanStatus::Deleted;
                return Ok(());
            }
        }
        self.records[index].status = BeanStatus::Resolved;
        Ok(())
    }
}

impl BeanLookup for ResolvePass<'_> {
    fn bean_count(&mut self, selector: &Selector) -> BeanResult<usize> {
        let candidates: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(selector))
            .map(|(i, _)| i)
            .collect();
        let mut count = 0;
        for i in candidates {
            self.resolve_bean(i)?;
            if self.records[i].status == BeanStatus::Resolved {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn check_duplicates(records: &[BeanRecord]) -> BeanResult<()> {
    for (i, a) in records.iter().enumerate() {
        if a.status == BeanStatus::Deleted {
            continue;
        }
        for b in records.iter().skip(i + 1) {
            if b.status != BeanStatus::Deleted
                && a.def.type_id == b.def.type_id
                && a.def.name == b.def.name
            {
                return Err(BeanError::Duplicate(a.def.describe()));
            }
        }
    }
    Ok(())
}

/// Anchored glob match where `*` spans any (possibly empty) substring.
fn pattern_match(pattern: &str, name: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == name;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = name;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    // Pattern ends with '*' (or was all wildcards): any remainder matches.
    true
}
