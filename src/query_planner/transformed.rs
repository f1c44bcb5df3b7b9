/// Result of running a pass: the plan, and whether the pass changed it.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed<T> {
    Yes(T),
    No(T),
}

impl<T> Transformed<T> {
    pub fn get_plan(self) -> T {
        match self {
            Transformed::Yes(plan) | Transformed::No(plan) => plan,
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Transformed::Yes(_))
    }

    pub fn from_flag(changed: bool, plan: T) -> Self {
        if changed {
            Transformed::Yes(plan)
        } else {
            Transformed::No(plan)
        }
    }
}
