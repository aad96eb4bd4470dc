/// A selector paired with the request it is benchmarked against.
#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    route: TestRoute,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, route: TestRoute) -> Self {
        Self { name, group, route }
    }

    pub fn literal(name: &'static str, route: TestRoute) -> Self {
        Self::new(name, TestGroup::Literal, route)
    }

    pub fn capture(name: &'static str, route: TestRoute) -> Self {
        Self::new(name, TestGroup::Capture, route)
    }

    pub fn rest(name: &'static str, route: TestRoute) -> Self {
        Self::new(name, TestGroup::Rest, route)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn route(&self) -> &TestRoute {
        &self.route
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TestRoute {
    selector: &'static str,
    method: &'static str,
    host: &'static str,
    path: &'static str,
}

impl TestRoute {
    pub const fn new(selector: &'static str, method: &'static str, host: &'static str, path: &'static str) -> Self {
        Self { selector, method, host, path }
    }

    pub fn selector(&self) -> &'static str {
        self.selector
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn host(&self) -> &'static str {
        self.host
    }

    pub fn path(&self) -> &'static str {
        self.path
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Literal,
    Capture,
    Rest,
}
