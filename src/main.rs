fn main() {
    launchpad_lib::run()
}
