//! Scope-aware destructor-call bookkeeping for complex temporaries.
//!
//! Pure bookkeeping: this module only tracks which `(destructor symbol,
//! storage pointer)` pairs were constructed inside which conditional
//! branch. Actual IR text for the unwind cascade is written by
//! `codegen::expr`, which is also the only place that knows label/temp
//! naming; keeping the two separate mirrors the planner/emitter split in
//! the component table.

/// One constructed temporary awaiting destruction: its destructor symbol,
/// its storage pointer register, and the pointee's IR type spelling (the
/// destructor takes `i8*`, so the cascade needs this to bitcast).
#[derive(Debug, Clone)]
pub struct Temp {
    pub dtor_symbol: String,
    pub ptr: String,
    pub ir_type: String,
}

/// A single conditional branch's scope: the temporaries constructed while
/// evaluating it, in construction order.
#[derive(Debug, Default)]
pub struct Scope {
    temps: Vec<Temp>,
}

impl Scope {
    pub fn record(&mut self, dtor_symbol: String, ptr: String, ir_type: String) {
        self.temps.push(Temp { dtor_symbol, ptr, ir_type });
    }

    pub fn is_empty(&self) -> bool {
        self.temps.is_empty()
    }

    /// Remove a temp by its pointer register, e.g. because it was just
    /// forwarded out of this scope instead of destroyed in it.
    pub fn disown(&mut self, ptr: &str) {
        self.temps.retain(|t| t.ptr != ptr);
    }

    /// Temporaries in reverse-of-construction order, i.e. destruction order.
    pub fn temps_reverse(&self) -> impl Iterator<Item = &Temp> {
        self.temps.iter().rev()
    }
}

/// A stack of open scopes; the innermost is where newly constructed
/// temporaries are recorded.
pub struct UnwindPlanner {
    stack: Vec<Scope>,
}

impl UnwindPlanner {
    pub fn new() -> Self {
        UnwindPlanner { stack: vec![Scope::default()] }
    }

    pub fn push_scope(&mut self) {
        self.stack.push(Scope::default());
    }

    pub fn pop_scope(&mut self) -> Scope {
        self.stack.pop().expect("unwind scope stack underflow")
    }

    pub fn record_temp(&mut self, dtor_symbol: String, ptr: String, ir_type: String) {
        self.stack
            .last_mut()
            .expect("unwind scope stack underflow")
            .record(dtor_symbol, ptr, ir_type);
    }

    /// Drop a temp from the current scope without destroying it, because
    /// ownership moved into a declaration's own slot.
    pub fn disown(&mut self, ptr: &str) {
        self.stack
            .last_mut()
            .expect("unwind scope stack underflow")
            .disown(ptr);
    }

    /// Pop the root scope at the end of an entry function's body.
    pub fn finish_root(&mut self) -> Scope {
        assert_eq!(self.stack.len(), 1, "unwind scopes left open at function exit");
        self.pop_scope()
    }
}

impl Default for UnwindPlanner {
    fn default() -> Self {
        UnwindPlanner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scope_has_no_temps() {
        let mut planner = UnwindPlanner::new();
        let scope = planner.pop_scope();
        assert!(scope.is_empty());
    }

    #[test]
    fn temps_destroyed_in_reverse_of_construction() {
        let mut planner = UnwindPlanner::new();
        planner.record_temp("@dtor_a".to_string(), "%t0".to_string(), "%struct.String".to_string());
        planner.record_temp("@dtor_b".to_string(), "%t1".to_string(), "%struct.String".to_string());
        let scope = planner.finish_root();
        let order: Vec<&str> = scope.temps_reverse().map(|t| t.ptr.as_str()).collect();
        assert_eq!(order, vec!["%t1", "%t0"]);
    }

    #[test]
    fn disowned_temp_is_excluded_from_destruction() {
        let mut planner = UnwindPlanner::new();
        planner.record_temp("@dtor_a".to_string(), "%t0".to_string(), "%struct.String".to_string());
        planner.disown("%t0");
        let scope = planner.finish_root();
        assert!(scope.is_empty());
    }
}
